//! Artifact bundle format.
//!
//! A bundle is a JSON document: the patch manifest fields at the top level
//! plus an `entries` array of base64 payloads laid out as `code/…`, `res/…`
//! and `lib/<abi>/…`.

use std::io;
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::domain::{LoadError, PatchManifest, ValidationError};

pub const BUNDLE_FORMAT: u32 = 1;

pub const CODE_DIR: &str = "code";
pub const RES_DIR: &str = "res";
pub const LIB_DIR: &str = "lib";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub path: String,

    /// Base64 (standard alphabet) payload.
    pub data: String,
}

impl BundleEntry {
    pub fn new(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub format: u32,

    #[serde(flatten)]
    pub manifest: PatchManifest,

    #[serde(default)]
    pub entries: Vec<BundleEntry>,
}

/// Header-only view; `entries` are skipped.
#[derive(Deserialize)]
struct BundleHeader {
    format: u32,

    #[serde(flatten)]
    manifest: PatchManifest,
}

impl ArtifactBundle {
    pub fn new(manifest: PatchManifest) -> Self {
        Self {
            format: BUNDLE_FORMAT,
            manifest,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, path: impl Into<String>, bytes: &[u8]) -> Self {
        self.entries.push(BundleEntry::new(path, bytes));
        self
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Reject entries that would escape the unpack directory.
    pub fn validate_entries(&self) -> Result<(), ValidationError> {
        for entry in &self.entries {
            if safe_entry_path(&entry.path).is_none() {
                return Err(ValidationError::UnsafeEntryPath(entry.path.clone()));
            }
        }
        Ok(())
    }

    /// Unpack every entry below `dest`.
    ///
    /// Writes into a sibling temp directory and renames it into place, so a
    /// present `dest` is always complete.
    pub fn unpack(&self, dest: &Path) -> Result<usize, LoadError> {
        let tmp = dest.with_extension("partial");
        remove_dir(&tmp)?;
        for entry in &self.entries {
            let rel = safe_entry_path(&entry.path)
                .ok_or_else(|| LoadError::Rejected(format!("unsafe entry {}", entry.path)))?;
            let bytes = entry
                .bytes()
                .map_err(|e| LoadError::Rejected(format!("entry {}: {e}", entry.path)))?;
            let target = tmp.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&target, bytes).map_err(|source| LoadError::Io {
                path: target.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&tmp).map_err(|source| LoadError::Io {
            path: tmp.clone(),
            source,
        })?;
        remove_dir(dest)?;
        std::fs::rename(&tmp, dest).map_err(|source| LoadError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(self.entries.len())
    }
}

fn remove_dir(dir: &Path) -> Result<(), LoadError> {
    super::layout::remove_dir_if_exists(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Relative, `..`-free path, or `None`.
pub fn safe_entry_path(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn unreadable(path: &Path, reason: impl ToString) -> ValidationError {
    ValidationError::UnreadableMetadata {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ValidationError> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ValidationError::ArtifactMissing(path.to_path_buf())
        } else {
            unreadable(path, e)
        }
    })
}

/// Read only the manifest part of a bundle.
pub fn read_manifest(path: &Path) -> Result<PatchManifest, ValidationError> {
    let bytes = read_bytes(path)?;
    let header: BundleHeader = serde_json::from_slice(&bytes).map_err(|e| unreadable(path, e))?;
    if header.format != BUNDLE_FORMAT {
        return Err(unreadable(
            path,
            format!("unsupported bundle format {}", header.format),
        ));
    }
    Ok(header.manifest)
}

/// Read the whole bundle, entries included.
pub fn read(path: &Path) -> Result<ArtifactBundle, ValidationError> {
    let bytes = read_bytes(path)?;
    let bundle: ArtifactBundle =
        serde_json::from_slice(&bytes).map_err(|e| unreadable(path, e))?;
    if bundle.format != BUNDLE_FORMAT {
        return Err(unreadable(
            path,
            format!("unsupported bundle format {}", bundle.format),
        ));
    }
    Ok(bundle)
}
