//! In-process delivery of implicit broadcasts to patch-only listeners.
//!
//! Patch listeners are invisible to the platform, so implicit broadcasts
//! are matched against the registry's filter rules and delivered here,
//! bypassing the broker. Delivery is synchronous on the caller's thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::{BroadcastResult, ComponentKind, DispatchRequest};
use crate::placeholder::ListenerCache;
use crate::ports::ComponentIdentity;
use crate::registry::ComponentRegistry;

/// Outcome of one in-process delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Listeners that ran without error.
    pub delivered: usize,
    pub failed: usize,
    /// Final result for ordered broadcasts.
    pub result: BroadcastResult,
}

pub struct ImplicitBroadcaster {
    registry: Arc<ComponentRegistry>,
    listeners: Arc<ListenerCache>,
    /// Identity template; the component field is replaced per listener.
    identity: ComponentIdentity,
}

impl ImplicitBroadcaster {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        listeners: Arc<ListenerCache>,
        identity: ComponentIdentity,
    ) -> Self {
        Self {
            registry,
            listeners,
            identity,
        }
    }

    /// Deliver to every matching patch listener in descending priority.
    ///
    /// Ordered broadcasts thread one result through the listeners and stop
    /// when a listener aborts. A failing or panicking listener is logged and
    /// skipped either way.
    pub fn deliver(&self, request: &DispatchRequest) -> Delivery {
        let mut delivery = Delivery::default();
        let Some(action) = request.action.as_deref() else {
            return delivery;
        };

        for rule in self.registry.filters_for(action) {
            if self
                .registry
                .is_declared_in_host(ComponentKind::Listener, &rule.component)
            {
                continue;
            }
            let Some(listener) = self.listeners.get_or_create(&rule.component) else {
                warn!(listener = %rule.component, action, "listener not resolvable, skipped");
                delivery.failed += 1;
                continue;
            };

            let identity = self.identity.for_component(&rule.component);
            let mut scratch = BroadcastResult::default();
            let result = if request.ordered {
                &mut delivery.result
            } else {
                &mut scratch
            };

            match catch_unwind(AssertUnwindSafe(|| {
                listener.on_receive(&identity, request, result)
            })) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    warn!(listener = %rule.component, action, error = %e, "listener failed");
                    delivery.failed += 1;
                }
                Err(_) => {
                    error!(listener = %rule.component, action, "listener panicked");
                    delivery.failed += 1;
                }
            }

            if request.ordered && delivery.result.aborted {
                debug!(listener = %rule.component, action, "ordered broadcast aborted");
                break;
            }
        }
        delivery
    }
}
