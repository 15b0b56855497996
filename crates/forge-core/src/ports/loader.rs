//! Loader ports - パッチのコード・リソース・ネイティブライブラリを
//! プロセスの lookup path にマージする

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{LoadError, Version};

pub trait CodeLoader: Send + Sync {
    /// `units` are the extracted code units of `version`.
    fn merge_code(&self, version: &Version, units: &[PathBuf]) -> Result<(), LoadError>;
}

pub trait ResourceLoader: Send + Sync {
    fn merge_resources(&self, version: &Version, artifact: &Path) -> Result<(), LoadError>;
}

pub trait NativeLibraryLoader: Send + Sync {
    /// `lib_dir` is the ABI directory chosen for this process, if the artifact ships one.
    fn merge_libraries(&self, version: &Version, lib_dir: Option<&Path>) -> Result<(), LoadError>;
}

/// The three loaders used by activation.
#[derive(Clone)]
pub struct Loaders {
    pub code: Arc<dyn CodeLoader>,
    pub resources: Arc<dyn ResourceLoader>,
    pub native: Arc<dyn NativeLibraryLoader>,
}
