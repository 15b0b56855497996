//! VersionStateManager - current / previous / runtime の 3 スロット
//!
//! # 永続化
//! - 正本は [`StateStore`]（namespace `forge`）
//! - スロット値はバージョン id か `"base"`
//! - バージョンごとのメタデータは `forge_version_<id>`、digest は `forge_digest_<id>`
//!
//! # runtime スロット
//! - このプロセスで activation が成功するまでメモリ上は未設定
//! - 診断用に `forge_runtime_version` にも書き出す
//!
//! 読み取り経路（[`VersionStateManager::slots`]）は失敗しません。
//! ストアが読めない場合は "no patch" として扱います。

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::app::status::VersionStateView;
use crate::domain::{BASE_SENTINEL, StoreError, Version, VersionPointer, VersionSlots};
use crate::ports::{StateStore, StoreOp};

pub const NAMESPACE: &str = "forge";

pub const KEY_CURRENT: &str = "forge_current_version";
pub const KEY_PREVIOUS: &str = "forge_previous_version";
pub const KEY_RUNTIME: &str = "forge_runtime_version";
pub const KEY_PENDING_RESTART: &str = "forge_pending_restart";
pub const KEY_LOAD_SUCCESS: &str = "forge_load_success";

const VERSION_KEY_PREFIX: &str = "forge_version_";
const DIGEST_KEY_PREFIX: &str = "forge_digest_";

pub fn version_key(id: &str) -> String {
    format!("{VERSION_KEY_PREFIX}{id}")
}

pub fn digest_key(id: &str) -> String {
    format!("{DIGEST_KEY_PREFIX}{id}")
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

pub struct VersionStateManager {
    store: Arc<dyn StateStore>,
    runtime: RwLock<Option<Version>>,
}

impl VersionStateManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            runtime: RwLock::new(None),
        }
    }

    /// Version active in this process.
    pub fn runtime(&self) -> Option<Version> {
        self.runtime.read().clone()
    }

    /// Snapshot of every slot; falls back to "no patch" on store failure.
    pub fn slots(&self) -> VersionSlots {
        self.try_slots().unwrap_or_else(|e| {
            warn!(error = %e, "version state unreadable, reporting no patch");
            VersionSlots {
                runtime: self.runtime(),
                ..VersionSlots::empty()
            }
        })
    }

    pub fn try_slots(&self) -> Result<VersionSlots, StoreError> {
        let current = self.read_pointer(KEY_CURRENT)?;
        let previous = self.read_pointer(KEY_PREVIOUS)?;
        let pending_restart = self.store.get(NAMESPACE, KEY_PENDING_RESTART)?.as_deref()
            == Some("true");
        let load_success = match self.store.get(NAMESPACE, KEY_LOAD_SUCCESS)?.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        };
        Ok(VersionSlots {
            current,
            previous,
            runtime: self.runtime(),
            pending_restart,
            load_success,
        })
    }

    /// Stored metadata for `id`, or `None` if absent or unreadable.
    pub fn load_version(&self, id: &str) -> Result<Option<Version>, StoreError> {
        let Some(raw) = self.store.get(NAMESPACE, &version_key(id))? else {
            return Ok(None);
        };
        match serde_json::from_str::<Version>(&raw) {
            Ok(version) => Ok(Some(version)),
            Err(e) => {
                warn!(version = id, error = %e, "corrupt version metadata ignored");
                Ok(None)
            }
        }
    }

    pub fn stored_digest(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(NAMESPACE, &digest_key(id))
    }

    fn read_pointer(&self, key: &str) -> Result<VersionPointer, StoreError> {
        match self.store.get(NAMESPACE, key)? {
            None => Ok(VersionPointer::Base),
            Some(value) if value == BASE_SENTINEL => Ok(VersionPointer::Base),
            Some(id) => match self.load_version(&id)? {
                Some(version) => Ok(VersionPointer::Patch(version)),
                None => {
                    warn!(slot = key, version = %id, "slot points at unknown version, treating as base");
                    Ok(VersionPointer::Base)
                }
            },
        }
    }

    /// Version a release of `releasing` demotes to *previous*.
    ///
    /// The in-process runtime when set; otherwise the last version recorded as
    /// active, which is what a manager process that never activated sees.
    /// Re-releasing the runtime itself must not leave both slots on the same
    /// id, so *current* (or base) is demoted instead.
    fn demotion_target(&self, releasing: &str) -> Result<VersionPointer, StoreError> {
        let runtime = match self.runtime() {
            Some(runtime) => VersionPointer::Patch(runtime),
            None => self.read_pointer(KEY_RUNTIME)?,
        };
        if runtime.slot_value() != releasing {
            return Ok(runtime);
        }
        let current = self.read_pointer(KEY_CURRENT)?;
        if current.slot_value() != releasing {
            return Ok(current);
        }
        Ok(VersionPointer::Base)
    }

    /// Persist `version` as *current*, demote the runtime to *previous*, mark restart pending.
    pub fn record_release(&self, version: &Version) -> Result<VersionSlots, StoreError> {
        let metadata = serde_json::to_string(version).map_err(|e| StoreError::Corrupt {
            path: version.artifact_path.clone(),
            reason: e.to_string(),
        })?;
        let previous = self.demotion_target(&version.id)?;
        self.store.apply(
            NAMESPACE,
            &[
                StoreOp::put(version_key(&version.id), metadata),
                StoreOp::put(digest_key(&version.id), version.digest.clone()),
                StoreOp::put(KEY_CURRENT, version.id.clone()),
                StoreOp::put(KEY_PREVIOUS, previous.slot_value()),
                StoreOp::put(KEY_PENDING_RESTART, flag(true)),
            ],
        )?;
        debug!(version = %version.id, previous = previous.slot_value(), "release recorded");
        self.try_slots()
    }

    /// Record that `active` is now loaded in this process.
    ///
    /// The in-memory runtime only changes once the store accepted the write.
    pub fn mark_activated(&self, active: &VersionPointer) -> Result<(), StoreError> {
        self.store.apply(
            NAMESPACE,
            &[
                StoreOp::put(KEY_RUNTIME, active.slot_value()),
                StoreOp::put(KEY_LOAD_SUCCESS, flag(true)),
                StoreOp::put(KEY_PENDING_RESTART, flag(false)),
            ],
        )?;
        *self.runtime.write() = active.as_patch().cloned();
        Ok(())
    }

    /// Activation of *current* failed: swap it with *previous* and record the failure.
    pub fn revert_failed_activation(&self) -> Result<VersionSlots, StoreError> {
        let slots = self.try_slots()?;
        let pending = slots.previous.slot_value() != slots.runtime_pointer().slot_value();
        self.store.apply(
            NAMESPACE,
            &[
                StoreOp::put(KEY_CURRENT, slots.previous.slot_value()),
                StoreOp::put(KEY_PREVIOUS, slots.current.slot_value()),
                StoreOp::put(KEY_LOAD_SUCCESS, flag(false)),
                StoreOp::put(KEY_PENDING_RESTART, flag(pending)),
            ],
        )?;
        self.try_slots()
    }

    /// Exchange *current* and *previous*; a restart is needed to apply the result.
    pub fn swap(&self) -> Result<VersionSlots, StoreError> {
        let slots = self.try_slots()?;
        self.store.apply(
            NAMESPACE,
            &[
                StoreOp::put(KEY_CURRENT, slots.previous.slot_value()),
                StoreOp::put(KEY_PREVIOUS, slots.current.slot_value()),
                StoreOp::put(KEY_PENDING_RESTART, flag(true)),
            ],
        )?;
        self.try_slots()
    }

    /// Drop one version's metadata and digest, repointing *previous* to base if it named it.
    pub fn forget(&self, id: &str) -> Result<(), StoreError> {
        let mut ops = vec![StoreOp::remove(version_key(id)), StoreOp::remove(digest_key(id))];
        if self.store.get(NAMESPACE, KEY_PREVIOUS)?.as_deref() == Some(id) {
            ops.push(StoreOp::put(KEY_PREVIOUS, BASE_SENTINEL));
        }
        self.store.apply(NAMESPACE, &ops)
    }

    /// Remove every patch key. The in-process runtime is left alone; it is still loaded.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let ops: Vec<StoreOp> = self
            .store
            .keys(NAMESPACE)?
            .into_iter()
            .map(StoreOp::remove)
            .collect();
        if ops.is_empty() {
            return Ok(());
        }
        self.store.apply(NAMESPACE, &ops)
    }

    pub fn view(&self, base_id: &str) -> VersionStateView {
        VersionStateView::from_slots(&self.slots(), base_id)
    }
}
