//! Three-way routing decision shared by every intercepted dispatch.

use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::{ComponentKind, DispatchError, DispatchRequest};
use crate::placeholder::PlaceholderNames;
use crate::registry::ComponentRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Host-declared: the platform already knows it.
    PassThrough,
    /// Patch-only: dispatch to `placeholder` with the true name in a marker.
    Redirect { placeholder: String },
    /// Known to neither manifest.
    Drop,
}

#[derive(Clone)]
pub struct Router {
    registry: Arc<ComponentRegistry>,
    names: PlaceholderNames,
}

impl Router {
    pub fn new(registry: Arc<ComponentRegistry>, names: PlaceholderNames) -> Self {
        Self { registry, names }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn names(&self) -> &PlaceholderNames {
        &self.names
    }

    pub fn route(&self, kind: ComponentKind, target: &str) -> RouteDecision {
        if self.registry.is_declared_in_host(kind, target) {
            return RouteDecision::PassThrough;
        }
        if !self.registry.is_patch_only(kind, target) {
            return RouteDecision::Drop;
        }
        let placeholder = match kind {
            ComponentKind::Launchable => self.names.launch(self.registry.launch_mode_of(target)),
            ComponentKind::Service => &self.names.service,
            ComponentKind::Listener => &self.names.listener,
            // providers are installed up front, never redirected
            ComponentKind::Provider => return RouteDecision::PassThrough,
        };
        RouteDecision::Redirect {
            placeholder: placeholder.to_string(),
        }
    }

    /// Rewrite `request` in place. Requests without a target are left untouched.
    pub fn apply(
        &self,
        kind: ComponentKind,
        request: &mut DispatchRequest,
    ) -> Result<RouteDecision, DispatchError> {
        let Some(target) = request.target.clone() else {
            return Ok(RouteDecision::PassThrough);
        };
        let decision = self.route(kind, &target);
        match &decision {
            RouteDecision::PassThrough => {}
            RouteDecision::Redirect { placeholder } => {
                debug!(%kind, target = %target, placeholder = %placeholder, "redirecting to placeholder");
                request.redirect_to(placeholder, &target);
            }
            RouteDecision::Drop => {
                error!(%kind, target = %target, "dropping dispatch to unknown component");
                return Err(DispatchError::UnknownTarget { kind, name: target });
            }
        }
        Ok(decision)
    }
}
