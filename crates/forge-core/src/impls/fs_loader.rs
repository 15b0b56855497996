//! FsLoader - ファイルシステム上でのコード・リソース・ネイティブライブラリのマージ
//!
//! コードユニットとネイティブライブラリはプロセスローカルのキャッシュに
//! コピーしてから lookup path の先頭に追加します（パッチ側が優先される）。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::artifact::{ForgeLayout, bundle};
use crate::domain::{LoadError, Version};
use crate::ports::{CodeLoader, Loaders, NativeLibraryLoader, ResourceLoader};

/// Active lookup paths of this process, patch entries first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupPaths {
    pub code: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub native: Vec<PathBuf>,
}

pub struct FsLoader {
    layout: ForgeLayout,
    paths: RwLock<LookupPaths>,
}

impl FsLoader {
    pub fn new(layout: ForgeLayout) -> Self {
        Self {
            layout,
            paths: RwLock::new(LookupPaths::default()),
        }
    }

    /// Use this loader for all three stages.
    pub fn loaders(self: &Arc<Self>) -> Loaders {
        Loaders {
            code: self.clone(),
            resources: self.clone(),
            native: self.clone(),
        }
    }

    pub fn lookup_paths(&self) -> LookupPaths {
        self.paths.read().clone()
    }
}

fn prepend(list: &mut Vec<PathBuf>, path: PathBuf) {
    list.retain(|p| p != &path);
    list.insert(0, path);
}

fn copy_into(src: &Path, dir: &Path) -> Result<PathBuf, LoadError> {
    let name = src
        .file_name()
        .ok_or_else(|| LoadError::Rejected(format!("{} has no file name", src.display())))?;
    copy_to(src, dir.join(name))
}

fn copy_to(src: &Path, target: PathBuf) -> Result<PathBuf, LoadError> {
    if let Some(parent) = target.parent() {
        create_dir(parent)?;
    }
    std::fs::copy(src, &target).map_err(|source| LoadError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    Ok(target)
}

fn create_dir(dir: &Path) -> Result<(), LoadError> {
    std::fs::create_dir_all(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

impl CodeLoader for FsLoader {
    fn merge_code(&self, version: &Version, units: &[PathBuf]) -> Result<(), LoadError> {
        let cache = self.layout.code_cache_dir(&version.id);
        create_dir(&cache)?;
        // units from the unpacked artifact keep their nesting so equal file names never collide
        let code_root = self.layout.unpack_dir(&version.id).join(bundle::CODE_DIR);
        let mut copied = Vec::with_capacity(units.len());
        for unit in units {
            let target = match unit.strip_prefix(&code_root) {
                Ok(rel) => copy_to(unit, cache.join(rel))?,
                Err(_) => copy_into(unit, &cache)?,
            };
            copied.push(target);
        }
        let mut paths = self.paths.write();
        for unit in copied.into_iter().rev() {
            prepend(&mut paths.code, unit);
        }
        info!(version = %version.id, units = units.len(), "code units merged");
        Ok(())
    }
}

impl ResourceLoader for FsLoader {
    fn merge_resources(&self, version: &Version, artifact: &Path) -> Result<(), LoadError> {
        if !artifact.is_file() {
            return Err(LoadError::MissingEntry(artifact.display().to_string()));
        }
        prepend(&mut self.paths.write().resources, artifact.to_path_buf());
        info!(version = %version.id, "resource table merged");
        Ok(())
    }
}

impl NativeLibraryLoader for FsLoader {
    fn merge_libraries(&self, version: &Version, lib_dir: Option<&Path>) -> Result<(), LoadError> {
        let Some(lib_dir) = lib_dir else {
            return Ok(());
        };
        let cache = self.layout.lib_cache_dir(&version.id);
        create_dir(&cache)?;
        let entries = std::fs::read_dir(lib_dir).map_err(|source| LoadError::Io {
            path: lib_dir.to_path_buf(),
            source,
        })?;
        let mut count = 0usize;
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: lib_dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                copy_into(&path, &cache)?;
                count += 1;
            }
        }
        prepend(&mut self.paths.write().native, cache);
        info!(version = %version.id, libraries = count, "native libraries merged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn version(id: &str, artifact: PathBuf) -> Version {
        Version {
            id: id.into(),
            code: 1,
            artifact_path: artifact,
            digest: String::new(),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn later_merges_take_precedence() {
        let tmp = TempDir::new().unwrap();
        let loader = FsLoader::new(ForgeLayout::new(tmp.path()));
        let a = tmp.path().join("a.artifact");
        let b = tmp.path().join("b.artifact");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        loader.merge_resources(&version("1", a.clone()), &a).unwrap();
        loader.merge_resources(&version("2", b.clone()), &b).unwrap();
        loader.merge_resources(&version("1", a.clone()), &a).unwrap();

        assert_eq!(loader.lookup_paths().resources, vec![a, b]);
    }

    #[test]
    fn code_units_are_copied_to_cache() {
        let tmp = TempDir::new().unwrap();
        let layout = ForgeLayout::new(tmp.path());
        let loader = FsLoader::new(layout.clone());
        let unit = tmp.path().join("app.unit");
        std::fs::write(&unit, b"unit").unwrap();

        loader
            .merge_code(&version("1.0.1", PathBuf::new()), &[unit])
            .unwrap();

        let cached = layout.code_cache_dir("1.0.1").join("app.unit");
        assert!(cached.is_file());
        assert_eq!(loader.lookup_paths().code, vec![cached]);
    }

    #[test]
    fn nested_code_units_keep_their_paths() {
        let tmp = TempDir::new().unwrap();
        let layout = ForgeLayout::new(tmp.path());
        let loader = FsLoader::new(layout.clone());
        let code = layout.unpack_dir("1.0.1").join(bundle::CODE_DIR);
        std::fs::create_dir_all(code.join("sync")).unwrap();
        std::fs::write(code.join("app.unit"), b"top").unwrap();
        std::fs::write(code.join("sync/app.unit"), b"nested").unwrap();

        loader
            .merge_code(
                &version("1.0.1", PathBuf::new()),
                &[code.join("app.unit"), code.join("sync/app.unit")],
            )
            .unwrap();

        let cache = layout.code_cache_dir("1.0.1");
        assert_eq!(std::fs::read(cache.join("app.unit")).unwrap(), b"top");
        assert_eq!(std::fs::read(cache.join("sync/app.unit")).unwrap(), b"nested");
        assert_eq!(
            loader.lookup_paths().code,
            vec![cache.join("app.unit"), cache.join("sync/app.unit")]
        );
    }

    #[test]
    fn missing_resource_artifact_fails() {
        let tmp = TempDir::new().unwrap();
        let loader = FsLoader::new(ForgeLayout::new(tmp.path()));
        let missing = tmp.path().join("gone");
        assert!(matches!(
            loader.merge_resources(&version("1", missing.clone()), &missing),
            Err(LoadError::MissingEntry(_))
        ));
    }

    #[test]
    fn no_lib_dir_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let loader = FsLoader::new(ForgeLayout::new(tmp.path()));
        loader
            .merge_libraries(&version("1", PathBuf::new()), None)
            .unwrap();
        assert!(loader.lookup_paths().native.is_empty());
    }
}
