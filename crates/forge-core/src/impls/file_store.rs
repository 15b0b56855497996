//! FileStateStore - namespace ごとに 1 つの JSON ファイルに保存するストア
//!
//! # 実装詳細
//! - 書き込みは一時ファイル + rename でアトミックに置き換える
//! - 単一のグローバル Mutex で全操作を直列化する
//! - 読み込んだ namespace はメモリにキャッシュする

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::StoreError;
use crate::ports::{StateStore, StoreOp};

type Namespace = BTreeMap<String, String>;

pub struct FileStateStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Namespace>>,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, ns: &str) -> PathBuf {
        self.dir.join(format!("{ns}.json"))
    }

    fn load(&self, ns: &str) -> Result<Namespace, StoreError> {
        let path = self.path_for(ns);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Namespace::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    fn persist(&self, ns: &str, map: &Namespace) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(ns);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(map).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_then_rename(&tmp, &path, &bytes).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(namespace = ns, keys = map.len(), "state store persisted");
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    std::fs::write(tmp, bytes)?;
    std::fs::rename(tmp, path)
}

impl StateStore for FileStateStore {
    fn get(&self, ns: &str, key: &str) -> Result<Option<String>, StoreError> {
        let mut cache = self.cache.lock();
        if !cache.contains_key(ns) {
            let loaded = self.load(ns)?;
            cache.insert(ns.to_string(), loaded);
        }
        Ok(cache.get(ns).and_then(|map| map.get(key)).cloned())
    }

    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let mut cache = self.cache.lock();
        if !cache.contains_key(ns) {
            let loaded = self.load(ns)?;
            cache.insert(ns.to_string(), loaded);
        }
        Ok(cache
            .get(ns)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn apply(&self, ns: &str, ops: &[StoreOp]) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        let mut next = match cache.get(ns) {
            Some(map) => map.clone(),
            None => self.load(ns)?,
        };
        super::apply_ops(&mut next, ops);
        // The cache only changes once the file is in place.
        self.persist(ns, &next)?;
        cache.insert(ns.to_string(), next);
        Ok(())
    }
}
