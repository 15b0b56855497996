//! UnpackOptimizer - インストール直後に artifact を `unzip/` に展開する
//!
//! 展開しておくと次回起動時の activation が速くなります。失敗しても
//! activation 側で展開し直すので、正しさには影響しません。

use async_trait::async_trait;

use crate::artifact::{ForgeLayout, bundle};
use crate::domain::{OptimizationError, Version};
use crate::ports::Optimizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackOptimizer;

#[async_trait]
impl Optimizer for UnpackOptimizer {
    fn name(&self) -> &'static str {
        "unpack"
    }

    async fn optimize(
        &self,
        version: &Version,
        layout: &ForgeLayout,
    ) -> Result<(), OptimizationError> {
        let artifact = version.artifact_path.clone();
        let dest = layout.unpack_dir(&version.id);
        tokio::task::spawn_blocking(move || {
            let bundle =
                bundle::read(&artifact).map_err(|e| OptimizationError::Unpack(e.to_string()))?;
            bundle
                .unpack(&dest)
                .map(|_| ())
                .map_err(|e| OptimizationError::Unpack(e.to_string()))
        })
        .await
        .map_err(|e| OptimizationError::Unpack(format!("unpack task: {e}")))?
    }
}
