//! ReleasePipeline - validate → install → optimize → persist
//!
//! # 並行性
//! - release は 1 本だけ。実行中の呼び出しは [`ReleaseError::Busy`] で即座に拒否
//! - rollback / clean / prune / reset も同じゲートを取り、取れなければ `false`
//! - ファイル IO は `spawn_blocking` で実行
//!
//! # 失敗時
//! - Validation / Install の失敗は状態を一切変更しない
//! - Optimizer の失敗はログに出して続行

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::app::config::RollbackPolicy;
use crate::app::status::VersionStateView;
use crate::app::version_state::VersionStateManager;
use crate::artifact::{ArtifactInstaller, ArtifactValidator, ForgeLayout, digest_file};
use crate::domain::{
    HostManifest, InstallError, PipelineState, ReleaseError, ReleaseId, ValidationError, Version,
    VersionTag,
};
use crate::ports::{Clock, IdGenerator, Optimizer};

/// Pipeline phase shared by the release side and activation.
#[derive(Debug, Clone, Default)]
pub struct PhaseCell(Arc<RwLock<PipelineState>>);

impl PhaseCell {
    pub fn get(&self) -> PipelineState {
        *self.0.read()
    }

    pub fn set(&self, state: PipelineState) {
        let previous = std::mem::replace(&mut *self.0.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "pipeline state");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Installed and recorded as *current*.
    Released(Version),
    /// Identical to *current*; nothing was reinstalled.
    AlreadyCurrent(Version),
}

impl ReleaseOutcome {
    pub fn version(&self) -> &Version {
        match self {
            ReleaseOutcome::Released(v) | ReleaseOutcome::AlreadyCurrent(v) => v,
        }
    }
}

/// What the store already knows about a release's id.
enum Existing {
    Current(Version),
    Installed(Version),
    Absent,
}

pub struct ReleasePipeline {
    layout: ForgeLayout,
    host: HostManifest,
    validator: ArtifactValidator,
    installer: ArtifactInstaller,
    state: Arc<VersionStateManager>,
    optimizers: Vec<Arc<dyn Optimizer>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    rollback_policy: RollbackPolicy,
    phase: PhaseCell,
    gate: Mutex<()>,
}

#[allow(clippy::too_many_arguments)]
impl ReleasePipeline {
    pub fn new(
        layout: ForgeLayout,
        host: HostManifest,
        state: Arc<VersionStateManager>,
        optimizers: Vec<Arc<dyn Optimizer>>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        rollback_policy: RollbackPolicy,
        phase: PhaseCell,
    ) -> Self {
        Self {
            validator: ArtifactValidator::new(host.identity()),
            installer: ArtifactInstaller::new(layout.clone()),
            layout,
            host,
            state,
            optimizers,
            ids,
            clock,
            rollback_policy,
            phase,
            gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.phase.get()
    }

    pub fn version_state(&self) -> &Arc<VersionStateManager> {
        &self.state
    }

    /// Never fails; unreadable state reports "no patch".
    pub fn query_version_state(&self) -> VersionStateView {
        self.state.view(&self.host.version.id)
    }

    /// Run one release through Persisted.
    pub async fn release(&self, artifact: &Path) -> Result<ReleaseOutcome, ReleaseError> {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!(artifact = %artifact.display(), "release rejected, another one is in flight");
            return Err(ReleaseError::Busy);
        };
        let release = self.ids.generate_release_id();
        info!(%release, artifact = %artifact.display(), "release started");

        let result = self.run_release(release, artifact.to_path_buf()).await;
        match &result {
            Ok(outcome) => {
                self.phase.set(PipelineState::Persisted);
                info!(%release, version = %outcome.version().tag(), "release persisted");
            }
            Err(e) => {
                self.phase.set(PipelineState::Idle);
                error!(%release, kind = ?e.kind(), error = %e, "release failed");
            }
        }
        result
    }

    async fn run_release(
        &self,
        release: ReleaseId,
        artifact: PathBuf,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        self.phase.set(PipelineState::Validating);
        let validator = self.validator.clone();
        let source = artifact.clone();
        let (tag, digest) = tokio::task::spawn_blocking(move || {
            let bundle = validator.validate(&source)?;
            let digest =
                digest_file(&source).map_err(|e| ValidationError::UnreadableMetadata {
                    path: source.clone(),
                    reason: e.to_string(),
                })?;
            Ok::<_, ValidationError>((bundle.manifest.version, digest))
        })
        .await
        .map_err(|e| InstallError::Aborted(format!("validation task: {e}")))??;

        let version = match self.check_existing(&tag, &digest)? {
            Existing::Current(current) => return Ok(ReleaseOutcome::AlreadyCurrent(current)),
            Existing::Installed(installed) => {
                info!(%release, version = %tag, "identical artifact already installed, reusing it");
                installed
            }
            Existing::Absent => {
                self.phase.set(PipelineState::Installing);
                let installer = self.installer.clone();
                let installed_at = self.clock.now();
                let version = tokio::task::spawn_blocking(move || {
                    installer.install(release, &artifact, &tag, installed_at)
                })
                .await
                .map_err(|e| InstallError::Aborted(format!("install task: {e}")))??;

                self.phase.set(PipelineState::Optimizing);
                for optimizer in &self.optimizers {
                    if let Err(e) = optimizer.optimize(&version, &self.layout).await {
                        warn!(%release, optimizer = optimizer.name(), error = %e, "optimization skipped");
                    }
                }
                version
            }
        };

        self.state.record_release(&version)?;
        Ok(ReleaseOutcome::Released(version))
    }

    /// Short-circuit an identical re-release; refuse reusing an id for different bytes.
    ///
    /// An identical artifact that is installed but not current (after a
    /// rollback, say) is reused as-is; reinstalling would wipe the unpack
    /// directory of a version that may be running.
    fn check_existing(&self, tag: &VersionTag, digest: &str) -> Result<Existing, ReleaseError> {
        let slots = self.state.try_slots()?;
        if let Some(current) = slots.current.as_patch()
            && current.is_same_release(tag, digest)
            && current.artifact_path.is_file()
        {
            info!(version = %tag, "release already current, skipping install");
            return Ok(Existing::Current(current.clone()));
        }
        match self.state.load_version(&tag.id)? {
            Some(existing) if existing.digest != digest => {
                Err(ValidationError::DigestConflict { id: tag.id.clone() }.into())
            }
            Some(existing)
                if existing.is_same_release(tag, digest) && existing.artifact_path.is_file() =>
            {
                Ok(Existing::Installed(existing))
            }
            _ => Ok(Existing::Absent),
        }
    }

    /// Swap *current* and *previous*. Returns `false` when there is nothing to do.
    pub async fn rollback(&self) -> bool {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!("rollback rejected, a release is in flight");
            return false;
        };
        let slots = match self.state.try_slots() {
            Ok(slots) => slots,
            Err(e) => {
                error!(error = %e, "rollback aborted, version state unreadable");
                return false;
            }
        };
        if !slots.can_rollback() {
            info!("nothing to roll back");
            return false;
        }
        if slots.previous.is_base() && self.rollback_policy == RollbackPolicy::Purge {
            info!(from = slots.current.slot_value(), "rolling back to base, purging patches");
            return self.purge().await;
        }
        match self.state.swap() {
            Ok(after) => {
                self.phase.set(PipelineState::RolledBack);
                info!(
                    current = after.current.slot_value(),
                    previous = after.previous.slot_value(),
                    "rolled back"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "rollback failed to persist");
                false
            }
        }
    }

    /// Delete the *previous* version's files and metadata. *current* is never touched.
    pub async fn clean_previous(&self) -> bool {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!("clean rejected, a release is in flight");
            return false;
        };
        let slots = match self.state.try_slots() {
            Ok(slots) => slots,
            Err(e) => {
                error!(error = %e, "clean aborted, version state unreadable");
                return false;
            }
        };
        let Some(previous) = slots.previous.as_patch() else {
            debug!("previous is base, nothing to clean");
            return false;
        };
        if previous.id == slots.current.slot_value() {
            return false;
        }
        let id = previous.id.clone();
        if !self.remove_version(&id).await {
            return false;
        }
        info!(version = %id, "previous version cleaned");
        true
    }

    /// Keep the `keep` most recently installed versions; *current* and
    /// *previous* survive regardless. Returns the removed ids.
    pub async fn prune(&self, keep: usize) -> Vec<String> {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!("prune rejected, a release is in flight");
            return Vec::new();
        };
        let slots = match self.state.try_slots() {
            Ok(slots) => slots,
            Err(e) => {
                error!(error = %e, "prune aborted, version state unreadable");
                return Vec::new();
            }
        };
        let layout = self.layout.clone();
        let installed = match tokio::task::spawn_blocking(move || layout.installed_version_ids()).await {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                error!(error = %e, "prune aborted, versions directory unreadable");
                return Vec::new();
            }
            Err(e) => {
                error!(error = %e, "prune task failed");
                return Vec::new();
            }
        };

        let mut by_age: Vec<(DateTime<Utc>, String)> = installed
            .into_iter()
            .map(|id| {
                let installed_at = self
                    .state
                    .load_version(&id)
                    .ok()
                    .flatten()
                    .map_or(DateTime::<Utc>::MIN_UTC, |v| v.installed_at);
                (installed_at, id)
            })
            .collect();
        by_age.sort_by(|a, b| b.cmp(a));

        let protected = [slots.current.slot_value(), slots.previous.slot_value()];
        let mut removed = Vec::new();
        for (_, id) in by_age.into_iter().skip(keep) {
            if protected.contains(&id.as_str()) {
                continue;
            }
            if self.remove_version(&id).await {
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            info!(removed = ?removed, keep, "versions pruned");
        }
        removed
    }

    /// Forget every patch and delete all version files.
    pub async fn reset(&self) -> bool {
        let Ok(_gate) = self.gate.try_lock() else {
            warn!("reset rejected, a release is in flight");
            return false;
        };
        self.purge().await
    }

    async fn purge(&self) -> bool {
        if let Err(e) = self.state.clear_all() {
            error!(error = %e, "failed to clear version state");
            return false;
        }
        let layout = self.layout.clone();
        match tokio::task::spawn_blocking(move || layout.remove_all_versions()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "version files left behind after purge"),
            Err(e) => warn!(error = %e, "purge task failed"),
        }
        self.phase.set(PipelineState::Idle);
        info!("all patches purged");
        true
    }

    async fn remove_version(&self, id: &str) -> bool {
        let layout = self.layout.clone();
        let target = id.to_string();
        match tokio::task::spawn_blocking(move || layout.remove_version_files(&target)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(version = id, error = %e, "failed to delete version files");
                return false;
            }
            Err(e) => {
                error!(version = id, error = %e, "delete task failed");
                return false;
            }
        }
        if let Err(e) = self.state.forget(id) {
            warn!(version = id, error = %e, "version files deleted but metadata kept");
        }
        true
    }
}
