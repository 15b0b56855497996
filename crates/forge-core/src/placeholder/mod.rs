//! Placeholder components.
//!
//! Placeholders are declared in the host manifest, so the platform will
//! dispatch to them. Each one reads the redirect marker, resolves the real
//! patch-only component through the merged code units, hands it the identity
//! the platform gave the placeholder, and forwards the lifecycle call.
//!
//! One type covers every variant; [`PlaceholderRole`] selects the behavior.
//! A resolution failure is terminal for that dispatch; nothing is retried.

mod listeners;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::{
    BroadcastResult, ComponentKind, DispatchError, DispatchRequest, LaunchMode, REDIRECT_MARKER_KEY,
    RedirectMarker,
};
use crate::ports::{
    Binding, ComponentFactory, ComponentFailure, ComponentIdentity, Launchable, Service,
};

pub use self::listeners::ListenerCache;

/// Which placeholder variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderRole {
    Launch(LaunchMode),
    Service,
    Listener,
}

impl PlaceholderRole {
    pub fn kind(self) -> ComponentKind {
        match self {
            PlaceholderRole::Launch(_) => ComponentKind::Launchable,
            PlaceholderRole::Service => ComponentKind::Service,
            PlaceholderRole::Listener => ComponentKind::Listener,
        }
    }
}

impl fmt::Display for PlaceholderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderRole::Launch(mode) => write!(f, "launch:{mode}"),
            PlaceholderRole::Service => f.write_str("service"),
            PlaceholderRole::Listener => f.write_str("listener"),
        }
    }
}

/// Host-declared names of the placeholder components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderNames {
    pub standard: String,
    pub single_top: String,
    pub single_task: String,
    pub single_instance: String,
    pub service: String,
    pub listener: String,
}

impl Default for PlaceholderNames {
    fn default() -> Self {
        Self {
            standard: "forge.placeholder.LaunchStandard".into(),
            single_top: "forge.placeholder.LaunchSingleTop".into(),
            single_task: "forge.placeholder.LaunchSingleTask".into(),
            single_instance: "forge.placeholder.LaunchSingleInstance".into(),
            service: "forge.placeholder.Service".into(),
            listener: "forge.placeholder.Listener".into(),
        }
    }
}

impl PlaceholderNames {
    pub fn launch(&self, mode: LaunchMode) -> &str {
        match mode {
            LaunchMode::Standard => &self.standard,
            LaunchMode::SingleTop => &self.single_top,
            LaunchMode::SingleTask => &self.single_task,
            LaunchMode::SingleInstance => &self.single_instance,
        }
    }

    pub fn for_role(&self, role: PlaceholderRole) -> &str {
        match role {
            PlaceholderRole::Launch(mode) => self.launch(mode),
            PlaceholderRole::Service => &self.service,
            PlaceholderRole::Listener => &self.listener,
        }
    }

    pub fn roles() -> Vec<PlaceholderRole> {
        let mut roles: Vec<PlaceholderRole> =
            LaunchMode::ALL.into_iter().map(PlaceholderRole::Launch).collect();
        roles.push(PlaceholderRole::Service);
        roles.push(PlaceholderRole::Listener);
        roles
    }

    pub fn role_of(&self, name: &str) -> Option<PlaceholderRole> {
        Self::roles()
            .into_iter()
            .find(|role| self.for_role(*role) == name)
    }
}

/// The request as the real component should see it: addressed to itself, marker removed.
fn forwarded_request(request: &DispatchRequest, name: &str) -> DispatchRequest {
    let mut forwarded = request.clone();
    forwarded.extras.remove(REDIRECT_MARKER_KEY);
    forwarded.target = Some(name.to_string());
    forwarded
}

/// A started real service. Calls into it run under its own lock, never the
/// table lock, so a service may stop itself from inside a callback.
struct RunningService {
    service: Box<dyn Service>,
    destroyed: bool,
}

impl RunningService {
    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.service.on_destroy();
        }
    }
}

type ServiceSlot = Arc<Mutex<RunningService>>;

pub struct Placeholder {
    role: PlaceholderRole,
    /// Identity the platform assigned to this placeholder instance.
    identity: ComponentIdentity,
    factory: Arc<dyn ComponentFactory>,
    listeners: Arc<ListenerCache>,
    /// Started real services, by qualified name.
    services: Mutex<HashMap<String, ServiceSlot>>,
}

impl Placeholder {
    pub fn new(
        role: PlaceholderRole,
        identity: ComponentIdentity,
        factory: Arc<dyn ComponentFactory>,
    ) -> Self {
        Self {
            role,
            identity,
            listeners: Arc::new(ListenerCache::new(factory.clone())),
            factory,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Share listener instances with implicit broadcast delivery.
    pub fn with_listener_cache(mut self, listeners: Arc<ListenerCache>) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn role(&self) -> PlaceholderRole {
        self.role
    }

    fn expect_kind(&self, requested: ComponentKind) -> Result<(), DispatchError> {
        if self.role.kind() == requested {
            Ok(())
        } else {
            Err(DispatchError::RoleMismatch {
                placeholder: self.identity.component.clone(),
                requested,
            })
        }
    }

    fn target(&self, request: &DispatchRequest) -> Result<String, DispatchError> {
        match RedirectMarker::read(request) {
            Some(marker) => Ok(marker.original),
            None => {
                error!(
                    placeholder = %self.identity.component,
                    role = %self.role,
                    "dispatch reached placeholder without redirect marker"
                );
                Err(DispatchError::MissingMarker {
                    placeholder: self.identity.component.clone(),
                })
            }
        }
    }

    fn unresolvable(&self, name: &str) -> DispatchError {
        error!(placeholder = %self.identity.component, target = name, "redirect target unresolvable");
        DispatchError::Unresolvable {
            name: name.to_string(),
        }
    }

    /// Instantiate the real launchable, attach identity and run `on_create`.
    pub fn launch(&self, request: &DispatchRequest) -> Result<Box<dyn Launchable>, DispatchError> {
        self.expect_kind(ComponentKind::Launchable)?;
        let name = self.target(request)?;
        let mut component = self
            .factory
            .launchable(&name)
            .ok_or_else(|| self.unresolvable(&name))?;
        component.attach(self.identity.for_component(&name));
        component
            .on_create(&forwarded_request(request, &name))
            .map_err(|e| DispatchError::ComponentFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        debug!(placeholder = %self.identity.component, target = %name, "launch forwarded");
        Ok(component)
    }

    fn service_slot(&self, name: &str) -> Result<ServiceSlot, DispatchError> {
        if let Some(slot) = self.services.lock().get(name) {
            return Ok(slot.clone());
        }
        let mut service = self
            .factory
            .service(name)
            .ok_or_else(|| self.unresolvable(name))?;
        service.attach(self.identity.for_component(name));
        let slot = Arc::new(Mutex::new(RunningService {
            service,
            destroyed: false,
        }));
        Ok(self
            .services
            .lock()
            .entry(name.to_string())
            .or_insert(slot)
            .clone())
    }

    fn is_registered(&self, name: &str, slot: &ServiceSlot) -> bool {
        self.services
            .lock()
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn with_service<T>(
        &self,
        request: &DispatchRequest,
        call: impl FnOnce(&mut dyn Service, &DispatchRequest) -> Result<T, ComponentFailure>,
    ) -> Result<T, DispatchError> {
        self.expect_kind(ComponentKind::Service)?;
        let name = self.target(request)?;
        let slot = self.service_slot(&name)?;
        let mut running = slot.lock();
        if running.destroyed {
            // stopped between lookup and lock; start over with a fresh instance
            drop(running);
            return self.with_service(request, call);
        }
        let result = call(running.service.as_mut(), &forwarded_request(request, &name));
        if !self.is_registered(&name, &slot) {
            debug!(placeholder = %self.identity.component, target = %name, "service stopped during dispatch");
            running.destroy();
        }
        result.map_err(|e| DispatchError::ComponentFailed {
            name: name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn start_service(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        self.with_service(request, |service, forwarded| service.on_start(forwarded))
    }

    pub fn bind_service(&self, request: &DispatchRequest) -> Result<Binding, DispatchError> {
        self.with_service(request, |service, forwarded| service.on_bind(forwarded))
    }

    /// Destroy the real service; `false` if it was not running.
    ///
    /// A service busy in a callback (including one stopping itself) is
    /// destroyed by that dispatch once the callback returns.
    pub fn stop_service(&self, request: &DispatchRequest) -> Result<bool, DispatchError> {
        self.expect_kind(ComponentKind::Service)?;
        let name = self.target(request)?;
        let removed = self.services.lock().remove(&name);
        let Some(slot) = removed else {
            return Ok(false);
        };
        if let Some(mut running) = slot.try_lock() {
            running.destroy();
        }
        Ok(true)
    }

    pub fn running_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver an explicit broadcast; result code/data flow back through `result`.
    pub fn receive(
        &self,
        request: &DispatchRequest,
        result: &mut BroadcastResult,
    ) -> Result<(), DispatchError> {
        self.expect_kind(ComponentKind::Listener)?;
        let name = self.target(request)?;
        let listener = self
            .listeners
            .get_or_create(&name)
            .ok_or_else(|| self.unresolvable(&name))?;
        listener
            .on_receive(
                &self.identity.for_component(&name),
                &forwarded_request(request, &name),
                result,
            )
            .map_err(|e| DispatchError::ComponentFailed {
                name,
                reason: e.to_string(),
            })
    }
}

/// Launchable stand-in the launch broker hands to the platform for a
/// placeholder class. `on_create` resolves and creates the real component.
pub struct LaunchablePlaceholder {
    mode: LaunchMode,
    name: String,
    factory: Arc<dyn ComponentFactory>,
    identity: Option<ComponentIdentity>,
    target: Option<Box<dyn Launchable>>,
}

impl LaunchablePlaceholder {
    pub fn new(mode: LaunchMode, name: impl Into<String>, factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            mode,
            name: name.into(),
            factory,
            identity: None,
            target: None,
        }
    }

    /// The real component, once `on_create` succeeded.
    pub fn target(&self) -> Option<&dyn Launchable> {
        self.target.as_deref()
    }
}

impl Launchable for LaunchablePlaceholder {
    fn attach(&mut self, identity: ComponentIdentity) {
        self.identity = Some(identity);
    }

    fn identity(&self) -> Option<&ComponentIdentity> {
        match &self.target {
            Some(target) => target.identity(),
            None => self.identity.as_ref(),
        }
    }

    fn on_create(&mut self, request: &DispatchRequest) -> Result<(), ComponentFailure> {
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| ComponentFailure::new(format!("{} created before attach", self.name)))?;
        let placeholder = Placeholder::new(
            PlaceholderRole::Launch(self.mode),
            identity,
            self.factory.clone(),
        );
        let target = placeholder
            .launch(request)
            .map_err(|e| ComponentFailure::new(e.to_string()))?;
        self.target = Some(target);
        Ok(())
    }
}
