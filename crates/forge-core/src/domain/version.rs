//! Version model: installed patch versions and the three named slots.
//!
//! A slot holds a [`VersionPointer`]: either a real installed [`Version`] or
//! the "base" sentinel, meaning "run the host package without any patch".

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// Value stored in a slot key when it points at the host package.
pub const BASE_SENTINEL: &str = "base";

/// Version identity as declared by a manifest (`id` + monotonically increasing `code`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    pub id: String,
    pub code: u64,
}

impl VersionTag {
    pub fn new(id: impl Into<String>, code: u64) -> Self {
        Self {
            id: id.into(),
            code,
        }
    }

    /// Version ids name directories under `versions/`, so they are restricted
    /// to a filename-safe alphabet.
    pub fn validate_id(&self) -> Result<(), ValidationError> {
        let id = self.id.as_str();
        let safe = !id.is_empty()
            && !id.starts_with('.')
            && id != BASE_SENTINEL
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if safe {
            Ok(())
        } else {
            Err(ValidationError::InvalidVersionId(self.id.clone()))
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.code)
    }
}

/// An installed patch version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub code: u64,

    /// Immutable copy of the artifact under `versions/<id>/base.artifact`.
    pub artifact_path: PathBuf,

    /// Lowercase hex SHA-256 of the installed artifact.
    pub digest: String,

    pub installed_at: DateTime<Utc>,
}

impl Version {
    pub fn tag(&self) -> VersionTag {
        VersionTag::new(self.id.clone(), self.code)
    }

    /// Same version metadata and same bytes.
    pub fn is_same_release(&self, tag: &VersionTag, digest: &str) -> bool {
        self.id == tag.id && self.code == tag.code && self.digest == digest
    }
}

/// Content of a version slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPointer {
    Base,
    Patch(Version),
}

impl VersionPointer {
    pub fn is_base(&self) -> bool {
        matches!(self, VersionPointer::Base)
    }

    pub fn as_patch(&self) -> Option<&Version> {
        match self {
            VersionPointer::Base => None,
            VersionPointer::Patch(version) => Some(version),
        }
    }

    /// The string persisted in the slot key.
    pub fn slot_value(&self) -> &str {
        match self {
            VersionPointer::Base => BASE_SENTINEL,
            VersionPointer::Patch(version) => &version.id,
        }
    }

    /// Display id, resolving "base" to the host version id.
    pub fn display_id<'a>(&'a self, base_id: &'a str) -> &'a str {
        match self {
            VersionPointer::Base => base_id,
            VersionPointer::Patch(version) => &version.id,
        }
    }
}

impl From<Option<Version>> for VersionPointer {
    fn from(version: Option<Version>) -> Self {
        version.map_or(VersionPointer::Base, VersionPointer::Patch)
    }
}

/// Snapshot of every persisted slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSlots {
    /// What will be activated at next process start.
    pub current: VersionPointer,

    /// One-step rollback target.
    pub previous: VersionPointer,

    /// What is active in this process (unset until activation succeeds).
    pub runtime: Option<Version>,

    pub pending_restart: bool,

    /// Outcome of the last activation attempt, if any.
    pub load_success: Option<bool>,
}

impl VersionSlots {
    /// "No patch" state: everything points at base.
    pub fn empty() -> Self {
        Self {
            current: VersionPointer::Base,
            previous: VersionPointer::Base,
            runtime: None,
            pending_restart: false,
            load_success: None,
        }
    }

    /// A rollback has somewhere to go when the two pointers differ.
    pub fn can_rollback(&self) -> bool {
        self.current.slot_value() != self.previous.slot_value()
    }

    pub fn runtime_pointer(&self) -> VersionPointer {
        self.runtime.clone().into()
    }
}

impl Default for VersionSlots {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn version(id: &str, code: u64) -> Version {
        Version {
            id: id.to_string(),
            code,
            artifact_path: PathBuf::from(format!("versions/{id}/base.artifact")),
            digest: "00".repeat(32),
            installed_at: Utc::now(),
        }
    }

    #[rstest]
    #[case::semver("1.0.1")]
    #[case::underscore("hotfix_2")]
    #[case::dash("2024-01-01")]
    fn accepts_safe_ids(#[case] id: &str) {
        assert!(VersionTag::new(id, 1).validate_id().is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::dot(".")]
    #[case::dotdot("..")]
    #[case::slash("1.0/../x")]
    #[case::sentinel("base")]
    #[case::space("1 0")]
    fn rejects_unsafe_ids(#[case] id: &str) {
        assert!(matches!(
            VersionTag::new(id, 1).validate_id(),
            Err(ValidationError::InvalidVersionId(_))
        ));
    }

    #[test]
    fn empty_slots_cannot_roll_back() {
        assert!(!VersionSlots::empty().can_rollback());
    }

    #[test]
    fn patch_over_base_can_roll_back() {
        let slots = VersionSlots {
            current: VersionPointer::Patch(version("1.0.1", 2)),
            ..VersionSlots::empty()
        };
        assert!(slots.can_rollback());
    }

    #[test]
    fn same_release_requires_matching_digest() {
        let v = version("1.0.1", 2);
        assert!(v.is_same_release(&VersionTag::new("1.0.1", 2), &v.digest));
        assert!(!v.is_same_release(&VersionTag::new("1.0.1", 2), "ff"));
        assert!(!v.is_same_release(&VersionTag::new("1.0.1", 3), &v.digest));
    }

    #[test]
    fn display_id_resolves_base_to_host_version() {
        assert_eq!(VersionPointer::Base.display_id("1.0.0"), "1.0.0");
        let p = VersionPointer::Patch(version("1.0.1", 2));
        assert_eq!(p.display_id("1.0.0"), "1.0.1");
    }
}
