//! Launch-broker substitution.
//!
//! Outgoing `start` requests naming a patch-only launchable are rewritten to
//! the placeholder for its launch mode. `new_instance` makes class resolution
//! succeed for placeholder classes and for types the code loader merged in.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{BrokerError, ComponentKind, DispatchRequest};
use crate::placeholder::{LaunchablePlaceholder, PlaceholderRole};
use crate::ports::{ComponentFactory, LaunchBroker, Launchable};

use super::router::Router;

pub struct ForgeLaunchBroker {
    inner: Arc<dyn LaunchBroker>,
    router: Router,
    factory: Arc<dyn ComponentFactory>,
}

impl ForgeLaunchBroker {
    pub fn new(inner: Arc<dyn LaunchBroker>, router: Router, factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            inner,
            router,
            factory,
        }
    }
}

impl LaunchBroker for ForgeLaunchBroker {
    fn start(&self, mut request: DispatchRequest) -> Result<(), BrokerError> {
        // unknown targets are logged by the router and never reach the platform
        if self.router.apply(ComponentKind::Launchable, &mut request).is_err() {
            return Ok(());
        }
        self.inner.start(request)
    }

    fn new_instance(&self, class_name: &str) -> Result<Box<dyn Launchable>, BrokerError> {
        if let Some(PlaceholderRole::Launch(mode)) = self.router.names().role_of(class_name) {
            return Ok(Box::new(LaunchablePlaceholder::new(
                mode,
                class_name,
                self.factory.clone(),
            )));
        }
        if self
            .router
            .registry()
            .is_patch_only(ComponentKind::Launchable, class_name)
        {
            debug!(class = class_name, "resolving class from merged code units");
            return self
                .factory
                .launchable(class_name)
                .ok_or_else(|| BrokerError::Rejected(format!("class not found: {class_name}")));
        }
        self.inner.new_instance(class_name)
    }
}
