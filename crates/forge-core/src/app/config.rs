//! ForgeConfig - TOML 設定
//!
//! すべての項目にデフォルト値があり、ファイルが無ければデフォルトで動きます。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ForgeLayout;
use crate::placeholder::PlaceholderNames;

/// Behavior of an explicit rollback whose target is the host package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Swap like any other rollback; files are kept and it can be undone.
    #[default]
    Retain,
    /// Clear all patch state and delete every version directory.
    Purge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// App-private directory holding `forge/`.
    pub root_dir: PathBuf,

    /// Host descriptor (JSON).
    pub host_manifest: PathBuf,

    /// Native library ABI preference, most preferred first.
    pub abis: Vec<String>,

    pub keep_versions: usize,

    /// Run the best-effort optimizing step after install.
    pub optimize: bool,

    pub rollback_to_base: RollbackPolicy,

    pub placeholders: PlaceholderNames,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            host_manifest: PathBuf::from("host.json"),
            abis: vec!["arm64-v8a".into(), "armeabi-v7a".into(), "x86_64".into()],
            keep_versions: 3,
            optimize: true,
            rollback_to_base: RollbackPolicy::Retain,
            placeholders: PlaceholderNames::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ForgeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn layout(&self) -> ForgeLayout {
        ForgeLayout::new(&self.root_dir)
    }
}
