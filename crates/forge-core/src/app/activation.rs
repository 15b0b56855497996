//! Activator - 次回起動時に *current* をプロセスへマージする
//!
//! # 手順
//! 1. 再検証（artifact の存在、記録済み digest、ホストとの identity）
//! 2. `unzip/` が無ければ展開
//! 3. コード → リソース → ネイティブライブラリの順にマージ
//!
//! どの段階で失敗しても *current* と *previous* を入れ替え（ファイルは消さない）、
//! エラーを呼び出し側に返します。プロセスはそのまま動き続けます。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::app::pipeline::PhaseCell;
use crate::app::version_state::VersionStateManager;
use crate::artifact::{ArtifactValidator, ForgeLayout, bundle, digest_file};
use crate::domain::{
    ActivationError, LoadError, LoadStage, PipelineState, ValidationError, Version, VersionPointer,
};
use crate::ports::Loaders;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// No patch is current; the host package runs as installed.
    Base,
    Patch(Version),
}

impl ActivationOutcome {
    pub fn version(&self) -> Option<&Version> {
        match self {
            ActivationOutcome::Base => None,
            ActivationOutcome::Patch(v) => Some(v),
        }
    }
}

pub struct Activator {
    layout: ForgeLayout,
    validator: ArtifactValidator,
    state: Arc<VersionStateManager>,
    loaders: Loaders,
    abis: Vec<String>,
    phase: PhaseCell,
}

fn load_err(stage: LoadStage) -> impl FnOnce(LoadError) -> ActivationError {
    move |source| ActivationError::Load { stage, source }
}

/// Code units under `unzip/code`, nested directories included, sorted by path.
fn code_units(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut units = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == root => {
                return Ok(Vec::new());
            }
            Err(source) => return Err(LoadError::Io { path: dir, source }),
        };
        for entry in entries {
            let path = entry
                .map_err(|source| LoadError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                units.push(path);
            }
        }
    }
    units.sort();
    Ok(units)
}

impl Activator {
    pub fn new(
        layout: ForgeLayout,
        validator: ArtifactValidator,
        state: Arc<VersionStateManager>,
        loaders: Loaders,
        abis: Vec<String>,
        phase: PhaseCell,
    ) -> Self {
        Self {
            layout,
            validator,
            state,
            loaders,
            abis,
            phase,
        }
    }

    /// Activate *current*. On failure the pointers are swapped back before returning.
    ///
    /// Failing to record the activation counts as a failed activation: the
    /// runtime stays unset and the patch is reverted like a load failure.
    pub fn activate(&self) -> Result<ActivationOutcome, ActivationError> {
        self.phase.set(PipelineState::Activating);
        let slots = self.state.slots();

        let VersionPointer::Patch(version) = slots.current else {
            if let Err(e) = self.state.mark_activated(&VersionPointer::Base) {
                error!(error = %e, "failed to record base activation");
                self.phase.set(PipelineState::RolledBack);
                return Err(e.into());
            }
            self.phase.set(PipelineState::RuntimeActive);
            info!("no patch current, running base");
            return Ok(ActivationOutcome::Base);
        };

        let activated = self.load(&version).and_then(|()| {
            self.state
                .mark_activated(&VersionPointer::Patch(version.clone()))
                .map_err(ActivationError::from)
        });
        match activated {
            Ok(()) => {
                self.phase.set(PipelineState::RuntimeActive);
                info!(version = %version.tag(), "patch activated");
                Ok(ActivationOutcome::Patch(version))
            }
            Err(e) => {
                error!(version = %version.tag(), error = %e, "activation failed, reverting to previous");
                match self.state.revert_failed_activation() {
                    Ok(after) => info!(
                        current = after.current.slot_value(),
                        previous = after.previous.slot_value(),
                        "version pointers swapped back"
                    ),
                    Err(store) => error!(error = %store, "failed to persist activation rollback"),
                }
                self.phase.set(PipelineState::RolledBack);
                Err(e)
            }
        }
    }

    fn load(&self, version: &Version) -> Result<(), ActivationError> {
        self.revalidate(version)?;

        let unpack_dir = self.layout.unpack_dir(&version.id);
        if !unpack_dir.is_dir() {
            let bundle = bundle::read(&version.artifact_path)?;
            bundle
                .unpack(&unpack_dir)
                .map_err(load_err(LoadStage::Unpack))?;
        }

        let units = code_units(&unpack_dir.join(bundle::CODE_DIR)).map_err(load_err(LoadStage::Code))?;
        self.loaders
            .code
            .merge_code(version, &units)
            .map_err(load_err(LoadStage::Code))?;

        self.loaders
            .resources
            .merge_resources(version, &version.artifact_path)
            .map_err(load_err(LoadStage::Resources))?;

        let lib_root = unpack_dir.join(bundle::LIB_DIR);
        let lib_dir = self
            .abis
            .iter()
            .map(|abi| lib_root.join(abi))
            .find(|dir| dir.is_dir());
        self.loaders
            .native
            .merge_libraries(version, lib_dir.as_deref())
            .map_err(load_err(LoadStage::NativeLibraries))?;
        Ok(())
    }

    fn revalidate(&self, version: &Version) -> Result<(), ValidationError> {
        let artifact = &version.artifact_path;
        if !artifact.is_file() {
            return Err(ValidationError::ArtifactMissing(artifact.clone()));
        }
        let expected = self
            .state
            .stored_digest(&version.id)
            .ok()
            .flatten()
            .unwrap_or_else(|| version.digest.clone());
        let actual = digest_file(artifact).map_err(|e| ValidationError::UnreadableMetadata {
            path: artifact.clone(),
            reason: e.to_string(),
        })?;
        if actual != expected {
            return Err(ValidationError::DigestMismatch {
                id: version.id.clone(),
            });
        }
        let manifest = bundle::read_manifest(artifact)?;
        self.validator.check_manifest(&manifest)
    }
}
