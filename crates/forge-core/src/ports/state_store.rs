//! StateStore port - 永続 key/value ストア（再起動をまたぐ唯一の正本）
//!
//! # 設計原則
//! - namespace ごとに key を分離
//! - `apply()` に渡した操作列は全部反映されるか、何も反映されないか
//! - 直列化はストア内部の単一ロックで行う（呼び出し側はロック不要）

use crate::domain::StoreError;

/// ストアへの 1 操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { key: String, value: String },
    Remove { key: String },
}

impl StoreOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        StoreOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        StoreOp::Remove { key: key.into() }
    }
}

/// StateStore は namespace 付きの永続 key/value ストア
pub trait StateStore: Send + Sync {
    fn get(&self, ns: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// namespace 内の全 key
    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError>;

    /// 操作列をアトミックに適用
    fn apply(&self, ns: &str, ops: &[StoreOp]) -> Result<(), StoreError>;

    fn put(&self, ns: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(ns, &[StoreOp::put(key, value)])
    }

    fn remove(&self, ns: &str, key: &str) -> Result<(), StoreError> {
        self.apply(ns, &[StoreOp::remove(key)])
    }
}
