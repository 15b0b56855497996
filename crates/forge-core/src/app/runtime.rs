//! ForgeRuntime - プロセス起動時のオーケストレーションとライフサイクル転送
//!
//! # start() の順序
//! 1. *current* の activation（失敗したら自動で previous に戻す）
//! 2. レジストリの初期化（activation に成功した artifact のマニフェスト、無ければホストのみ）
//! 3. Interception layer のインストール
//!
//! activation が失敗してもフックはインストールします（ホストのコンポーネントは動く）。

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::app::activation::{ActivationOutcome, Activator};
use crate::app::pipeline::ReleasePipeline;
use crate::domain::{ActivationError, HookError, HostManifest};
use crate::intercept::{HookReport, InterceptionLayer};
use crate::ports::{AppDelegate, ComponentFactory, PlatformHooks};
use crate::registry::ComponentRegistry;

#[derive(Debug)]
pub struct StartReport {
    pub activation: Result<ActivationOutcome, ActivationError>,
    pub hooks: HookReport,
}

pub struct ForgeRuntime {
    host: HostManifest,
    registry: Arc<ComponentRegistry>,
    interception: InterceptionLayer,
    activator: Activator,
    pipeline: Arc<ReleasePipeline>,
    factory: Arc<dyn ComponentFactory>,
    delegate: RwLock<Option<Arc<dyn AppDelegate>>>,
}

impl ForgeRuntime {
    pub(crate) fn new(
        host: HostManifest,
        registry: Arc<ComponentRegistry>,
        interception: InterceptionLayer,
        activator: Activator,
        pipeline: ReleasePipeline,
        factory: Arc<dyn ComponentFactory>,
    ) -> Self {
        Self {
            host,
            registry,
            interception,
            activator,
            pipeline: Arc::new(pipeline),
            factory,
            delegate: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &HostManifest {
        &self.host
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn interception(&self) -> &InterceptionLayer {
        &self.interception
    }

    pub fn pipeline(&self) -> &Arc<ReleasePipeline> {
        &self.pipeline
    }

    /// Activation only, without touching the registry or the platform.
    pub fn activate(&self) -> Result<ActivationOutcome, ActivationError> {
        self.activator.activate()
    }

    /// Activate, index components, then arm interception.
    ///
    /// Only a failed launch-broker substitution is an error here; activation
    /// failures are reported in the [`StartReport`].
    pub fn start(&self, hooks: &dyn PlatformHooks) -> Result<StartReport, HookError> {
        let activation = self.activator.activate();
        let active_artifact = match &activation {
            Ok(outcome) => outcome.version().map(|v| v.artifact_path.clone()),
            Err(e) => {
                error!(error = %e, "starting without patch components");
                None
            }
        };

        self.registry.init(&self.host, active_artifact.as_deref());
        self.resolve_delegate();

        let hooks = self.interception.install(hooks)?;
        Ok(StartReport { activation, hooks })
    }

    fn resolve_delegate(&self) {
        let Some(name) = self.registry.application() else {
            return;
        };
        match self.factory.app_delegate(&name) {
            Some(delegate) => *self.delegate.write() = Some(delegate),
            None => warn!(application = %name, "application delegate not resolvable"),
        }
    }

    fn delegate(&self) -> Option<Arc<dyn AppDelegate>> {
        let delegate = self.delegate.read().clone();
        if delegate.is_none() {
            debug!("no application delegate, lifecycle forward skipped");
        }
        delegate
    }

    pub fn dispatch_startup(&self) {
        if let Some(delegate) = self.delegate() {
            delegate.on_startup();
        }
    }

    pub fn dispatch_low_memory(&self) {
        if let Some(delegate) = self.delegate() {
            delegate.on_low_memory();
        }
    }

    pub fn dispatch_trim(&self, level: u32) {
        if let Some(delegate) = self.delegate() {
            delegate.on_trim(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::ForgeBuilder;
    use crate::app::config::{ForgeConfig, RollbackPolicy};
    use crate::app::pipeline::ReleaseOutcome;
    use crate::domain::{
        ComponentKind, DispatchRequest, PipelineState, REDIRECT_MARKER_KEY, ReleaseError,
        ValidationError,
    };
    use crate::app::version_state::KEY_RUNTIME;
    use crate::artifact::ForgeLayout;
    use crate::impls::{FsLoader, InMemoryStateStore, StaticComponentFactory};
    use crate::ports::{CodeLoader, FixedClock, LaunchBroker, Loaders, Optimizer, StateStore};
    use crate::testing::{
        FakePlatform, RejectingStore, host_with_placeholders, patch_manifest,
        patch_with_components, write_artifact,
    };
    use crate::domain::{LoadError, OptimizationError, Version};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct Env {
        tmp: TempDir,
        store: Arc<dyn StateStore>,
        config: ForgeConfig,
    }

    impl Env {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let config = ForgeConfig {
                root_dir: tmp.path().join("app"),
                ..ForgeConfig::default()
            };
            Self {
                tmp,
                store: Arc::new(InMemoryStateStore::new()),
                config,
            }
        }

        /// A fresh process over the same store and files.
        fn process(&self) -> ForgeRuntime {
            self.builder().build().unwrap()
        }

        fn builder(&self) -> ForgeBuilder {
            ForgeBuilder::new(self.config.clone(), host_with_placeholders(vec![]))
                .with_store(self.store.clone())
        }

        fn artifact(&self, id: &str, code: u64) -> PathBuf {
            write_artifact(self.tmp.path(), patch_with_components(id, code))
        }
    }

    struct FailingCode;

    impl CodeLoader for FailingCode {
        fn merge_code(&self, _version: &Version, _units: &[PathBuf]) -> Result<(), LoadError> {
            Err(LoadError::Rejected("dex verification failed".into()))
        }
    }

    struct FailingOptimizer;

    #[async_trait]
    impl Optimizer for FailingOptimizer {
        fn name(&self) -> &'static str {
            "aot"
        }

        async fn optimize(
            &self,
            _version: &Version,
            _layout: &ForgeLayout,
        ) -> Result<(), OptimizationError> {
            Err(OptimizationError::Compile("compiler crashed".into()))
        }
    }

    #[derive(Default)]
    struct CountingDelegate {
        startups: AtomicU32,
        trims: AtomicU32,
    }

    impl AppDelegate for CountingDelegate {
        fn on_startup(&self) {
            self.startups.fetch_add(1, Ordering::SeqCst);
        }

        fn on_trim(&self, level: u32) {
            self.trims.fetch_add(level, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn release_activate_rollback_scenario() {
        let env = Env::new();
        let manager = env.process();
        let view = manager.pipeline().query_version_state();
        assert_eq!(view.pending_next, "1.0.0");
        assert!(!view.can_rollback);

        manager.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();
        assert_eq!(manager.pipeline().query_version_state().pending_next, "1.0.1");
        assert_eq!(manager.pipeline().state(), PipelineState::Persisted);

        let next = env.process();
        let report = next.start(&FakePlatform::new()).unwrap();
        assert!(report.activation.is_ok());
        let view = next.pipeline().query_version_state();
        assert_eq!(view.runtime, "1.0.1");
        assert!(view.can_rollback);
        assert!(!view.pending_restart);

        assert!(next.pipeline().rollback().await);
        let view = next.pipeline().query_version_state();
        assert_eq!(view.pending_next, "1.0.0");
        assert!(view.can_rollback);
        assert!(view.pending_restart);

        // roll forward again
        assert!(next.pipeline().rollback().await);
        assert_eq!(next.pipeline().query_version_state().pending_next, "1.0.1");
    }

    #[tokio::test]
    async fn foreign_artifact_leaves_state_untouched() {
        let env = Env::new();
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();
        let before = forge.pipeline().query_version_state();

        let mut foreign = patch_manifest("2.0.0", 3);
        foreign.package = "com.other.app".into();
        let path = write_artifact(env.tmp.path(), foreign);
        let err = forge.pipeline().release(&path).await.unwrap_err();

        assert!(matches!(
            err,
            ReleaseError::Validation(ValidationError::PackageMismatch { .. })
        ));
        assert_eq!(forge.pipeline().query_version_state(), before);
        assert_eq!(forge.pipeline().state(), PipelineState::Idle);
        assert!(!env.config.layout().version_dir("2.0.0").exists());
    }

    #[tokio::test]
    async fn identical_release_short_circuits() {
        let env = Env::new();
        let forge = env.process();
        let artifact = env.artifact("1.0.1", 2);
        forge.pipeline().release(&artifact).await.unwrap();

        let again = forge.pipeline().release(&artifact).await.unwrap();
        assert!(matches!(again, ReleaseOutcome::AlreadyCurrent(_)));
    }

    #[tokio::test]
    async fn reused_id_with_new_bytes_is_rejected() {
        let env = Env::new();
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        let mut changed = patch_with_components("1.0.1", 2);
        changed.application = Some("patch.App".into());
        let path = env.tmp.path().join("changed.artifact");
        crate::artifact::ArtifactBundle::new(changed).write_to(&path).unwrap();

        assert!(matches!(
            forge.pipeline().release(&path).await,
            Err(ReleaseError::Validation(ValidationError::DigestConflict { .. }))
        ));
    }

    #[tokio::test]
    async fn failed_activation_swaps_pointers() {
        let env = Env::new();
        let first = env.process();
        first.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();
        let second = env.process();
        second.activate().unwrap();
        second.pipeline().release(&env.artifact("1.0.2", 3)).await.unwrap();
        let before = second.pipeline().version_state().slots();

        let layout = env.config.layout();
        let fs = Arc::new(FsLoader::new(layout));
        let loaders = Loaders {
            code: Arc::new(FailingCode),
            ..fs.loaders()
        };
        let broken = env.builder().with_loaders(loaders).build().unwrap();
        let report = broken.start(&FakePlatform::new()).unwrap();

        assert!(matches!(report.activation, Err(ActivationError::Load { .. })));
        assert_eq!(broken.pipeline().state(), PipelineState::RolledBack);
        let after = broken.pipeline().version_state().slots();
        assert_eq!(after.current, before.previous);
        assert_eq!(after.previous, before.current);
        // files are kept
        assert!(env.config.layout().artifact_path("1.0.2").is_file());
        // registry fell back to host-only
        assert!(!broken.registry().exists(ComponentKind::Service, "patch.SyncService"));
        assert!(report.hooks.launch);
    }

    #[tokio::test]
    async fn tampered_artifact_fails_revalidation() {
        let env = Env::new();
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();
        std::fs::write(env.config.layout().artifact_path("1.0.1"), b"{}").unwrap();

        let next = env.process();
        assert!(matches!(
            next.activate(),
            Err(ActivationError::Validation(ValidationError::DigestMismatch { .. }))
        ));
        assert!(next.pipeline().version_state().slots().current.is_base());
    }

    #[tokio::test]
    async fn clean_never_touches_current() {
        let env = Env::new();
        let a = env.process();
        a.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();
        let b = env.process();
        b.activate().unwrap();
        b.pipeline().release(&env.artifact("1.0.2", 3)).await.unwrap();

        assert!(b.pipeline().clean_previous().await);

        let layout = env.config.layout();
        assert!(!layout.version_dir("1.0.1").exists());
        assert!(layout.artifact_path("1.0.2").is_file());
        let slots = b.pipeline().version_state().slots();
        assert_eq!(slots.current.slot_value(), "1.0.2");
        assert!(slots.previous.is_base());
        assert!(!b.pipeline().clean_previous().await);
    }

    #[tokio::test]
    async fn prune_keeps_current_and_previous() {
        let env = Env::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        for (minute, (id, code)) in [("1.0.1", 2), ("1.0.2", 3), ("1.0.3", 4), ("1.0.4", 5)]
            .into_iter()
            .enumerate()
        {
            let at = start + Duration::minutes(minute as i64);
            let p = env
                .builder()
                .with_clock(Arc::new(FixedClock::new(at)))
                .build()
                .unwrap();
            p.activate().unwrap();
            p.pipeline().release(&env.artifact(id, code)).await.unwrap();
        }
        let forge = env.process();
        assert_eq!(
            forge.pipeline().version_state().load_version("1.0.2").unwrap().unwrap().installed_at,
            start + Duration::minutes(1)
        );

        let removed = forge.pipeline().prune(1).await;

        // 1.0.4 current, 1.0.3 previous; the rest go oldest first
        assert_eq!(removed, vec!["1.0.2".to_string(), "1.0.1".to_string()]);
        assert_eq!(
            env.config.layout().installed_version_ids().unwrap(),
            vec!["1.0.3".to_string(), "1.0.4".to_string()]
        );
    }

    #[tokio::test]
    async fn rerelease_after_rollback_keeps_base_reachable() {
        let env = Env::new();
        let artifact = env.artifact("1.0.1", 2);
        env.process().pipeline().release(&artifact).await.unwrap();
        let running = env.process();
        running.start(&FakePlatform::new()).unwrap();
        assert!(running.pipeline().rollback().await);
        let unpacked = env.config.layout().unpack_dir("1.0.1");
        assert!(unpacked.is_dir());

        let outcome = running.pipeline().release(&artifact).await.unwrap();

        assert!(matches!(outcome, ReleaseOutcome::Released(_)));
        let slots = running.pipeline().version_state().slots();
        assert_eq!(slots.current.slot_value(), "1.0.1");
        assert!(slots.previous.is_base());
        // the running version's unpack is not rebuilt
        assert!(unpacked.is_dir());
        let view = running.pipeline().query_version_state();
        assert!(view.can_rollback);

        assert!(running.pipeline().rollback().await);
        assert_eq!(running.pipeline().query_version_state().pending_next, "1.0.0");
    }

    #[tokio::test]
    async fn unrecorded_activation_is_rolled_back() {
        let env = Env::new();
        env.process().pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        let store = Arc::new(RejectingStore::new(env.store.clone(), KEY_RUNTIME));
        let forge = env.builder().with_store(store).build().unwrap();
        let report = forge.start(&FakePlatform::new()).unwrap();

        assert!(matches!(report.activation, Err(ActivationError::Store(_))));
        assert_eq!(forge.pipeline().state(), PipelineState::RolledBack);
        let slots = forge.pipeline().version_state().slots();
        assert_eq!(slots.runtime, None);
        assert!(slots.current.is_base());
        assert_eq!(slots.previous.slot_value(), "1.0.1");
        assert_eq!(slots.load_success, Some(false));
        assert!(!forge.registry().exists(ComponentKind::Service, "patch.SyncService"));
    }

    #[tokio::test]
    async fn optimizer_failure_does_not_abort_release() {
        let env = Env::new();
        let forge = env
            .builder()
            .with_optimizers(vec![Arc::new(FailingOptimizer)])
            .build()
            .unwrap();

        let outcome = forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        assert!(matches!(outcome, ReleaseOutcome::Released(_)));
        assert_eq!(forge.pipeline().state(), PipelineState::Persisted);
        let unpacked = env.config.layout().unpack_dir("1.0.1");
        assert!(!unpacked.exists());

        let next = env.process();
        let activated = next.activate().unwrap();
        assert_eq!(activated.version().map(|v| v.id.as_str()), Some("1.0.1"));
        assert!(unpacked.is_dir());
    }

    #[tokio::test]
    async fn purge_policy_deletes_everything() {
        let mut env = Env::new();
        env.config.rollback_to_base = RollbackPolicy::Purge;
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        assert!(forge.pipeline().rollback().await);

        let view = forge.pipeline().query_version_state();
        assert_eq!(view.pending_next, "1.0.0");
        assert!(!view.can_rollback);
        assert!(env.config.layout().installed_version_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_state_and_files() {
        let env = Env::new();
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        assert!(forge.pipeline().reset().await);

        assert!(!env.config.layout().versions_dir().exists());
        assert!(env.store.keys("forge").unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_wires_registry_and_hooks() {
        let env = Env::new();
        let forge = env.process();
        forge.pipeline().release(&env.artifact("1.0.1", 2)).await.unwrap();

        let delegate = Arc::new(CountingDelegate::default());
        let handle = delegate.clone();
        let factory = StaticComponentFactory::new()
            .with_app_delegate("patch.App", move || handle.clone());
        let mut manifest = patch_with_components("1.0.2", 3);
        manifest.application = Some("patch.App".into());
        let path = write_artifact(env.tmp.path(), manifest);
        forge.pipeline().release(&path).await.unwrap();

        let next = env
            .builder()
            .with_component_factory(Arc::new(factory))
            .build()
            .unwrap();
        let platform = FakePlatform::new();
        let report = next.start(&platform).unwrap();

        assert_eq!(report.hooks.providers, 1);
        assert!(next.registry().is_patch_only(ComponentKind::Service, "patch.SyncService"));

        platform
            .launch_broker()
            .start(DispatchRequest::explicit("patch.Detail"))
            .unwrap();
        assert_eq!(
            platform.original_launch.started.lock()[0]
                .extras
                .get(REDIRECT_MARKER_KEY)
                .map(String::as_str),
            Some("patch.Detail")
        );

        next.dispatch_startup();
        next.dispatch_low_memory();
        next.dispatch_trim(20);
        assert_eq!(delegate.startups.load(Ordering::SeqCst), 1);
        assert_eq!(delegate.trims.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn concurrent_release_is_rejected() {
        let env = Env::new();
        let forge = Arc::new(env.process());
        let a = env.artifact("1.0.1", 2);
        let b = env.artifact("1.0.2", 3);

        let (first, second) = tokio::join!(
            forge.pipeline().release(&a),
            forge.pipeline().release(&b)
        );

        // the first poll takes the gate; the second is turned away
        assert!(first.is_ok());
        assert!(matches!(second, Err(ReleaseError::Busy)));
    }
}
