//! State - release/activation パイプラインの状態
//!
//! # 状態遷移
//! - Idle → Validating → Installing → Optimizing → Persisted
//! - (次回起動時) Persisted → Activating → RuntimeActive | RolledBack
//! - 失敗した release は Idle に戻る（何も永続化しない）

use std::fmt;

use serde::{Deserialize, Serialize};

/// PipelineState はパイプラインの現在位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Validating,
    Installing,
    Optimizing,
    Persisted,
    Activating,
    RuntimeActive,
    RolledBack,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Installing => "installing",
            PipelineState::Optimizing => "optimizing",
            PipelineState::Persisted => "persisted",
            PipelineState::Activating => "activating",
            PipelineState::RuntimeActive => "runtime_active",
            PipelineState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}
