//! App - アプリケーション層
//!
//! ports を組み合わせて release / activation / 起動時オーケストレーションを実装します。
//!
//! # 主要コンポーネント
//! - **ForgeBuilder**: ランタイムの構築とワイヤリング
//! - **ForgeRuntime**: 起動時の activation → レジストリ初期化 → フックのインストール
//! - **ReleasePipeline**: validate → install → optimize → persist と rollback / clean / prune
//! - **Activator**: 次回起動時のマージと失敗時の自動ロールバック
//! - **VersionStateManager**: current / previous / runtime スロット

pub mod activation;
pub mod builder;
pub mod config;
pub mod pipeline;
pub mod runtime;
pub mod status;
pub mod version_state;

// 主要な型を再エクスポート
pub use self::activation::{ActivationOutcome, Activator};
pub use self::builder::{BuildError, ForgeBuilder};
pub use self::config::{ConfigError, ForgeConfig, RollbackPolicy};
pub use self::pipeline::{PhaseCell, ReleaseOutcome, ReleasePipeline};
pub use self::runtime::{ForgeRuntime, StartReport};
pub use self::status::VersionStateView;
pub use self::version_state::VersionStateManager;
