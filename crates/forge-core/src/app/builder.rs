//! ForgeBuilder - ランタイムの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定された placeholder 名がすべてホストの記述子に宣言されているかを
//!   `build()` 時にチェック
//! - 足りなければ [`BuildError::MissingPlaceholders`] を返す
//!
//! 明示的に渡されなかった port には本番用の実装を使います
//! （`FileStateStore`, `FsLoader`, `UnpackOptimizer`, `SystemClock`）。

use std::sync::Arc;

use crate::app::activation::Activator;
use crate::app::config::ForgeConfig;
use crate::app::pipeline::{PhaseCell, ReleasePipeline};
use crate::app::runtime::ForgeRuntime;
use crate::app::version_state::VersionStateManager;
use crate::artifact::ArtifactValidator;
use crate::domain::HostManifest;
use crate::impls::{FileStateStore, FsLoader, StaticComponentFactory, UnpackOptimizer};
use crate::intercept::InterceptionLayer;
use crate::placeholder::PlaceholderNames;
use crate::ports::{
    Clock, ComponentFactory, IdGenerator, Loaders, Optimizer, StateStore, SystemClock,
    UlidGenerator,
};
use crate::registry::ComponentRegistry;

/// BuildError はランタイム構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing placeholders: {0:?}. The host descriptor must declare them.")]
    MissingPlaceholders(Vec<String>),
}

/// ForgeBuilder はランタイムを構築
///
/// # 使用例
/// ```ignore
/// let forge = ForgeBuilder::new(config, host)
///     .with_component_factory(factory)
///     .build()?;
/// let report = forge.start(&platform_hooks)?;
/// ```
pub struct ForgeBuilder {
    config: ForgeConfig,
    host: HostManifest,
    store: Option<Arc<dyn StateStore>>,
    factory: Option<Arc<dyn ComponentFactory>>,
    loaders: Option<Loaders>,
    optimizers: Option<Vec<Arc<dyn Optimizer>>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ForgeBuilder {
    pub fn new(config: ForgeConfig, host: HostManifest) -> Self {
        Self {
            config,
            host,
            store: None,
            factory: None,
            loaders: None,
            optimizers: None,
            clock: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_component_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_loaders(mut self, loaders: Loaders) -> Self {
        self.loaders = Some(loaders);
        self
    }

    /// Replace the default optimizer list.
    pub fn with_optimizers(mut self, optimizers: Vec<Arc<dyn Optimizer>>) -> Self {
        self.optimizers = Some(optimizers);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn missing_placeholders(&self) -> Vec<String> {
        let names = &self.config.placeholders;
        PlaceholderNames::roles()
            .into_iter()
            .map(|role| (role.kind(), names.for_role(role)))
            .filter(|(kind, name)| {
                !self
                    .host
                    .components
                    .iter()
                    .any(|c| c.kind == *kind && c.name == *name)
            })
            .map(|(_, name)| name.to_string())
            .collect()
    }

    pub fn build(self) -> Result<ForgeRuntime, BuildError> {
        let missing = self.missing_placeholders();
        if !missing.is_empty() {
            return Err(BuildError::MissingPlaceholders(missing));
        }

        let layout = self.config.layout();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStateStore::new(layout.state_dir())));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(StaticComponentFactory::new()));
        let loaders = self
            .loaders
            .unwrap_or_else(|| Arc::new(FsLoader::new(layout.clone())).loaders());
        let optimizers = self.optimizers.unwrap_or_else(|| {
            if self.config.optimize {
                vec![Arc::new(UnpackOptimizer) as Arc<dyn Optimizer>]
            } else {
                Vec::new()
            }
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));

        let state = Arc::new(VersionStateManager::new(store));
        let phase = PhaseCell::default();
        let pipeline = ReleasePipeline::new(
            layout.clone(),
            self.host.clone(),
            state.clone(),
            optimizers,
            ids,
            clock,
            self.config.rollback_to_base,
            phase.clone(),
        );
        let activator = Activator::new(
            layout,
            ArtifactValidator::new(self.host.identity()),
            state,
            loaders,
            self.config.abis.clone(),
            phase,
        );
        let registry = Arc::new(ComponentRegistry::new());
        let interception = InterceptionLayer::new(
            registry.clone(),
            factory.clone(),
            self.config.placeholders.clone(),
            self.host.package.clone(),
        );

        Ok(ForgeRuntime::new(
            self.host,
            registry,
            interception,
            activator,
            pipeline,
            factory,
        ))
    }
}
