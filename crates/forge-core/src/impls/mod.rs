//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FileStateStore**: JSON ファイルによる永続ストア（本番用）
//! - **InMemoryStateStore**: テスト・開発用ストア
//! - **FsLoader**: ファイルシステム上の 3 種類の loader
//! - **UnpackOptimizer**: インストール後の展開
//! - **StaticComponentFactory**: 名前登録式の ComponentFactory
//!
//! broker の差し替え（PlatformHooks）はプラットフォーム固有のため、
//! ここには含めません。

pub mod file_store;
pub mod fs_loader;
pub mod memory_store;
pub mod optimizer;
pub mod static_factory;

use std::collections::BTreeMap;

use crate::ports::StoreOp;

pub use self::file_store::FileStateStore;
pub use self::fs_loader::{FsLoader, LookupPaths};
pub use self::memory_store::InMemoryStateStore;
pub use self::optimizer::UnpackOptimizer;
pub use self::static_factory::StaticComponentFactory;

pub(crate) fn apply_ops(map: &mut BTreeMap<String, String>, ops: &[StoreOp]) {
    for op in ops {
        match op {
            StoreOp::Put { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            StoreOp::Remove { key } => {
                map.remove(key);
            }
        }
    }
}
