//! On-disk layout under the app-private directory.
//!
//! ```text
//! <app_dir>/forge/
//!   versions/<id>/base.artifact
//!   versions/<id>/unzip/{code,res,lib}/...
//!   versions/.staging-<release-id>
//!   cache/code/<id>/
//!   cache/lib/<id>/
//!   state/<namespace>.json
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::domain::ReleaseId;

pub const ARTIFACT_FILE: &str = "base.artifact";
pub const UNPACK_DIR: &str = "unzip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeLayout {
    root: PathBuf,
}

impl ForgeLayout {
    pub fn new(app_dir: impl AsRef<Path>) -> Self {
        Self {
            root: app_dir.as_ref().join("forge"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(ARTIFACT_FILE)
    }

    pub fn unpack_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(UNPACK_DIR)
    }

    pub fn code_cache_dir(&self, id: &str) -> PathBuf {
        self.root.join("cache").join("code").join(id)
    }

    pub fn lib_cache_dir(&self, id: &str) -> PathBuf {
        self.root.join("cache").join("lib").join(id)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn staging_path(&self, release: ReleaseId) -> PathBuf {
        self.versions_dir().join(format!(".staging-{release}"))
    }

    /// Version directories currently on disk (staging files excluded).
    pub fn installed_version_ids(&self) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(self.versions_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete the version directory and its process-local caches.
    pub fn remove_version_files(&self, id: &str) -> io::Result<()> {
        for dir in [
            self.version_dir(id),
            self.code_cache_dir(id),
            self.lib_cache_dir(id),
        ] {
            remove_dir_if_exists(&dir)?;
        }
        Ok(())
    }

    /// Delete every installed version and cache.
    pub fn remove_all_versions(&self) -> io::Result<()> {
        remove_dir_if_exists(&self.versions_dir())?;
        remove_dir_if_exists(&self.root.join("cache"))
    }
}

pub(crate) fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
