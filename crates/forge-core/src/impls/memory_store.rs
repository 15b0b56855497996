//! InMemoryStateStore - テスト・開発用のストア
//!
//! プロセスが終われば消えます。1 つの Mutex で全 namespace を直列化します。

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::domain::StoreError;
use crate::ports::{StateStore, StoreOp};

#[derive(Default)]
pub struct InMemoryStateStore {
    namespaces: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, ns: &str, key: &str) -> Result<Option<String>, StoreError> {
        let namespaces = self.namespaces.lock();
        Ok(namespaces.get(ns).and_then(|map| map.get(key)).cloned())
    }

    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let namespaces = self.namespaces.lock();
        Ok(namespaces
            .get(ns)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn apply(&self, ns: &str, ops: &[StoreOp]) -> Result<(), StoreError> {
        let mut namespaces = self.namespaces.lock();
        let map = namespaces.entry(ns.to_string()).or_default();
        super::apply_ops(map, ops);
        Ok(())
    }
}
