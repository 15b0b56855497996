//! Copies a validated artifact into its immutable version directory.

use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use super::layout::{ForgeLayout, remove_dir_if_exists};
use crate::domain::{InstallError, ReleaseId, Version, VersionTag};

/// Lowercase hex SHA-256 of a file.
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct ArtifactInstaller {
    layout: ForgeLayout,
}

impl ArtifactInstaller {
    pub fn new(layout: ForgeLayout) -> Self {
        Self { layout }
    }

    /// Copy `artifact` to `versions/<id>/base.artifact` and digest the copy.
    ///
    /// The copy lands in a staging file first; on any failure the staging
    /// file is removed and the version directory is left untouched.
    pub fn install(
        &self,
        release: ReleaseId,
        artifact: &Path,
        tag: &VersionTag,
        installed_at: DateTime<Utc>,
    ) -> Result<Version, InstallError> {
        let versions = self.layout.versions_dir();
        std::fs::create_dir_all(&versions).map_err(|source| InstallError::CreateDir {
            path: versions.clone(),
            source,
        })?;

        let staging = self.layout.staging_path(release);
        let result = self.stage_and_commit(&staging, artifact, tag);
        if result.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        let digest = result?;

        let version = Version {
            id: tag.id.clone(),
            code: tag.code,
            artifact_path: self.layout.artifact_path(&tag.id),
            digest,
            installed_at,
        };
        info!(
            %release,
            version = %tag,
            digest = %version.digest,
            "artifact installed"
        );
        Ok(version)
    }

    fn stage_and_commit(
        &self,
        staging: &Path,
        artifact: &Path,
        tag: &VersionTag,
    ) -> Result<String, InstallError> {
        std::fs::copy(artifact, staging).map_err(|source| InstallError::Copy {
            path: staging.to_path_buf(),
            source,
        })?;
        let digest = digest_file(staging).map_err(|source| InstallError::Digest {
            path: staging.to_path_buf(),
            source,
        })?;

        let dir = self.layout.version_dir(&tag.id);
        std::fs::create_dir_all(&dir).map_err(|source| InstallError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        // A stale unpack from an earlier attempt would not match the new bytes.
        let unpack = self.layout.unpack_dir(&tag.id);
        remove_dir_if_exists(&unpack).map_err(|source| InstallError::Copy {
            path: unpack.clone(),
            source,
        })?;
        let target = self.layout.artifact_path(&tag.id);
        std::fs::rename(staging, &target).map_err(|source| InstallError::Copy {
            path: target.clone(),
            source,
        })?;
        Ok(digest)
    }
}
