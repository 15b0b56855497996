//! Artifact validation against the host identity and trust anchor.

use std::path::Path;

use tracing::debug;

use super::bundle::{self, ArtifactBundle};
use crate::domain::{Identity, PatchManifest, ValidationError};

/// Confirms a candidate artifact belongs to the host before anything is installed.
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    host: Identity,
}

impl ArtifactValidator {
    pub fn new(host: Identity) -> Self {
        Self { host }
    }

    /// Full validation: readable bundle, matching identity, safe version id and entries.
    pub fn validate(&self, artifact: &Path) -> Result<ArtifactBundle, ValidationError> {
        if !artifact.is_file() {
            return Err(ValidationError::ArtifactMissing(artifact.to_path_buf()));
        }
        let bundle = bundle::read(artifact)?;
        self.check_manifest(&bundle.manifest)?;
        bundle.validate_entries()?;
        debug!(
            artifact = %artifact.display(),
            version = %bundle.manifest.version,
            entries = bundle.entries.len(),
            "artifact validated"
        );
        Ok(bundle)
    }

    pub fn check_manifest(&self, manifest: &PatchManifest) -> Result<(), ValidationError> {
        self.check_identity(&manifest.identity())?;
        manifest.version.validate_id()
    }

    pub fn check_identity(&self, candidate: &Identity) -> Result<(), ValidationError> {
        if candidate.package != self.host.package {
            return Err(ValidationError::PackageMismatch {
                host: self.host.package.clone(),
                artifact: candidate.package.clone(),
            });
        }
        if candidate.signer != self.host.signer {
            return Err(ValidationError::SignerMismatch {
                package: candidate.package.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HOST_PACKAGE, HOST_SIGNER, patch_manifest};
    use tempfile::TempDir;

    fn validator() -> ArtifactValidator {
        ArtifactValidator::new(Identity {
            package: HOST_PACKAGE.into(),
            signer: HOST_SIGNER.into(),
        })
    }

    #[test]
    fn matching_artifact_passes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.artifact");
        ArtifactBundle::new(patch_manifest("1.0.1", 2))
            .write_to(&path)
            .unwrap();
        let bundle = validator().validate(&path).unwrap();
        assert_eq!(bundle.manifest.version.code, 2);
    }

    #[test]
    fn missing_artifact_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            validator().validate(&tmp.path().join("missing")),
            Err(ValidationError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn foreign_package_is_rejected() {
        let mut manifest = patch_manifest("1.0.1", 2);
        manifest.package = "com.other.app".into();
        assert!(matches!(
            validator().check_manifest(&manifest),
            Err(ValidationError::PackageMismatch { .. })
        ));
    }

    #[test]
    fn foreign_signer_is_rejected() {
        let mut manifest = patch_manifest("1.0.1", 2);
        manifest.signer = "AA:BB".into();
        assert!(matches!(
            validator().check_manifest(&manifest),
            Err(ValidationError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn unsafe_entry_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.artifact");
        ArtifactBundle::new(patch_manifest("1.0.1", 2))
            .with_entry("../escape", b"x")
            .write_to(&path)
            .unwrap();
        assert!(matches!(
            validator().validate(&path),
            Err(ValidationError::UnsafeEntryPath(_))
        ));
    }
}
