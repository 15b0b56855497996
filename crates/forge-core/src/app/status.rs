//! Status - バージョン状態のクエリ結果
//!
//! `query_version_state()` が返すビュー。ストアが読めない場合でも
//! "no patch" として必ず値を返します。

use serde::Serialize;

use crate::domain::VersionSlots;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionStateView {
    /// Host package version id.
    pub base: String,

    /// Version active in this process; the base id when nothing is loaded.
    pub runtime: String,

    /// Version the next process start will activate.
    pub pending_next: String,

    pub can_rollback: bool,

    pub pending_restart: bool,
}

impl VersionStateView {
    pub fn from_slots(slots: &VersionSlots, base_id: &str) -> Self {
        Self {
            base: base_id.to_string(),
            runtime: slots
                .runtime
                .as_ref()
                .map_or_else(|| base_id.to_string(), |v| v.id.clone()),
            pending_next: slots.current.display_id(base_id).to_string(),
            can_rollback: slots.can_rollback(),
            pending_restart: slots.pending_restart,
        }
    }
}
