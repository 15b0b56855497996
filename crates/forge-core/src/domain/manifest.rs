//! Host descriptor and patch manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::component::ComponentDecl;
use super::errors::ValidationError;
use super::version::VersionTag;

/// Package identity plus signing identity; both must match for a patch to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub package: String,
    pub signer: String,
}

/// Manifest of the originally installed host package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostManifest {
    pub package: String,
    pub signer: String,
    pub version: VersionTag,

    #[serde(default)]
    pub components: Vec<ComponentDecl>,
}

impl HostManifest {
    pub fn identity(&self) -> Identity {
        Identity {
            package: self.package.clone(),
            signer: self.signer.clone(),
        }
    }

    /// Load a host descriptor from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ValidationError> {
        let bytes = std::fs::read(path).map_err(|e| ValidationError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ValidationError::UnreadableMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn declares(&self, name: &str) -> bool {
        self.components.iter().any(|c| c.name == name)
    }
}

/// Manifest carried inside a patch artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManifest {
    pub package: String,
    pub signer: String,
    pub version: VersionTag,

    /// Optional application delegate receiving lifecycle forwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,

    #[serde(default)]
    pub components: Vec<ComponentDecl>,
}

impl PatchManifest {
    pub fn identity(&self) -> Identity {
        Identity {
            package: self.package.clone(),
            signer: self.signer.clone(),
        }
    }
}
