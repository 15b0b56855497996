//! Interception layer - platform broker の差し替え
//!
//! # 差し替えの順序
//! 1. launch broker（必須：失敗したら [`HookError`] を返す）
//! 2. service / listener broker（任意：失敗はログに出してスキップ）
//! 3. provider のインストール（任意）
//!
//! # 実装
//! - 差し替えごとに「インストール済み」フラグを持ち、2 回目は何もしない
//! - `install()` 全体も one-shot latch で保護する
//! - 差し替えの仕組みそのものは [`PlatformHooks`] の実装に任せる

pub mod broadcast;
pub mod launch;
pub mod provider;
pub mod router;
pub mod service;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::domain::HookError;
use crate::placeholder::{ListenerCache, Placeholder, PlaceholderNames, PlaceholderRole};
use crate::ports::{ComponentFactory, ComponentIdentity, PlatformHooks};
use crate::registry::ComponentRegistry;

pub use self::broadcast::{Delivery, ImplicitBroadcaster};
pub use self::launch::ForgeLaunchBroker;
pub use self::router::{RouteDecision, Router};
pub use self::service::{CallHandler, ForgeServiceBroker, default_handlers};

/// What one `install()` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    /// The latch was already closed; nothing was attempted.
    pub already_installed: bool,
    pub launch: bool,
    pub service: bool,
    pub providers: usize,
    /// Optional substitutions that failed and were skipped.
    pub skipped: Vec<&'static str>,
}

pub struct InterceptionLayer {
    router: Router,
    factory: Arc<dyn ComponentFactory>,
    listeners: Arc<ListenerCache>,
    broadcaster: Arc<ImplicitBroadcaster>,
    package: String,
    latch: AtomicBool,
    launch_installed: AtomicBool,
    service_installed: AtomicBool,
    providers_installed: AtomicBool,
}

impl InterceptionLayer {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        factory: Arc<dyn ComponentFactory>,
        names: PlaceholderNames,
        package: impl Into<String>,
    ) -> Self {
        let package = package.into();
        let listeners = Arc::new(ListenerCache::new(factory.clone()));
        let broadcaster = Arc::new(ImplicitBroadcaster::new(
            registry.clone(),
            listeners.clone(),
            ComponentIdentity {
                package: package.clone(),
                process: package.clone(),
                component: String::new(),
                token: 0,
            },
        ));
        Self {
            router: Router::new(registry, names),
            factory,
            listeners,
            broadcaster,
            package,
            latch: AtomicBool::new(false),
            launch_installed: AtomicBool::new(false),
            service_installed: AtomicBool::new(false),
            providers_installed: AtomicBool::new(false),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.latch.load(Ordering::Acquire)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn broadcaster(&self) -> &Arc<ImplicitBroadcaster> {
        &self.broadcaster
    }

    /// Placeholder instance for a platform-created stand-in, sharing listener instances.
    pub fn placeholder(&self, role: PlaceholderRole, identity: ComponentIdentity) -> Placeholder {
        Placeholder::new(role, identity, self.factory.clone())
            .with_listener_cache(self.listeners.clone())
    }

    /// Arm every substitution. Must run before any component is dispatched.
    pub fn install(&self, hooks: &dyn PlatformHooks) -> Result<HookReport, HookError> {
        if self
            .latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(HookReport {
                already_installed: true,
                ..HookReport::default()
            });
        }

        let mut report = HookReport::default();
        if let Err(e) = self.install_launch(hooks) {
            error!(api_level = hooks.api_level(), error = %e, "launch broker substitution failed");
            // nothing was swapped, a later call may retry
            self.latch.store(false, Ordering::Release);
            return Err(e);
        }
        report.launch = true;

        match self.install_service(hooks) {
            Ok(()) => report.service = true,
            Err(e) => {
                warn!(api_level = hooks.api_level(), error = %e, "service broker substitution skipped");
                report.skipped.push("service");
            }
        }

        match self.install_providers(hooks) {
            Ok(count) => report.providers = count,
            Err(e) => {
                warn!(error = %e, "provider installation skipped");
                report.skipped.push("providers");
            }
        }

        info!(
            service = report.service,
            providers = report.providers,
            "interception layer installed"
        );
        Ok(report)
    }

    fn install_launch(&self, hooks: &dyn PlatformHooks) -> Result<(), HookError> {
        if self.launch_installed.load(Ordering::Acquire) {
            return Ok(());
        }
        let inner = hooks.current_launch_broker()?;
        hooks.replace_launch_broker(Arc::new(ForgeLaunchBroker::new(
            inner,
            self.router.clone(),
            self.factory.clone(),
        )))?;
        self.launch_installed.store(true, Ordering::Release);
        Ok(())
    }

    fn install_service(&self, hooks: &dyn PlatformHooks) -> Result<(), HookError> {
        if self.service_installed.load(Ordering::Acquire) {
            return Ok(());
        }
        let inner = hooks.current_service_broker()?;
        hooks.replace_service_broker(Arc::new(ForgeServiceBroker::new(
            inner,
            self.router.clone(),
            self.broadcaster.clone(),
        )))?;
        self.service_installed.store(true, Ordering::Release);
        Ok(())
    }

    fn install_providers(&self, hooks: &dyn PlatformHooks) -> Result<usize, HookError> {
        if self.providers_installed.load(Ordering::Acquire) {
            return Ok(0);
        }
        let host = hooks.provider_host()?;
        let count = provider::install_providers(&*host, self.router.registry(), &self.package)
            .map_err(|e| HookError::Substitution {
                broker: "provider",
                reason: e.to_string(),
            })?;
        self.providers_installed.store(true, Ordering::Release);
        Ok(count)
    }
}
