//! Optimizer port - インストール後のベストエフォート最適化
//!
//! 失敗しても release は止めません（コールドスタートの短縮にしか効かないため）。

use async_trait::async_trait;

use crate::artifact::ForgeLayout;
use crate::domain::{OptimizationError, Version};

#[async_trait]
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn optimize(&self, version: &Version, layout: &ForgeLayout)
    -> Result<(), OptimizationError>;
}
