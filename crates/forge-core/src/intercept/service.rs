//! Service/listener-broker substitution.
//!
//! Calls are routed through an explicit method → handler table; methods
//! missing from the table pass through to the platform unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{BrokerError, ComponentKind};
use crate::ports::{BrokerCall, BrokerMethod, BrokerReply, ServiceBroker};

use super::broadcast::ImplicitBroadcaster;
use super::router::Router;

/// What the proxy does with one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallHandler {
    /// Three-way branch against service declarations.
    RedirectService,
    /// Explicit: three-way branch against listeners. Implicit: in-process delivery first.
    RedirectBroadcast,
    PassThrough,
}

pub fn default_handlers() -> HashMap<BrokerMethod, CallHandler> {
    HashMap::from([
        (BrokerMethod::StartService, CallHandler::RedirectService),
        (BrokerMethod::BindService, CallHandler::RedirectService),
        (BrokerMethod::StopService, CallHandler::RedirectService),
        (BrokerMethod::SendBroadcast, CallHandler::RedirectBroadcast),
    ])
}

pub struct ForgeServiceBroker {
    inner: Arc<dyn ServiceBroker>,
    router: Router,
    broadcaster: Arc<ImplicitBroadcaster>,
    handlers: HashMap<BrokerMethod, CallHandler>,
}

impl ForgeServiceBroker {
    pub fn new(
        inner: Arc<dyn ServiceBroker>,
        router: Router,
        broadcaster: Arc<ImplicitBroadcaster>,
    ) -> Self {
        Self {
            inner,
            router,
            broadcaster,
            handlers: default_handlers(),
        }
    }

    pub fn handler_for(&self, method: &BrokerMethod) -> CallHandler {
        self.handlers
            .get(method)
            .copied()
            .unwrap_or(CallHandler::PassThrough)
    }

    fn redirect(&self, kind: ComponentKind, mut call: BrokerCall) -> Result<BrokerReply, BrokerError> {
        if self.router.apply(kind, &mut call.request).is_err() {
            return Ok(BrokerReply::Dropped);
        }
        self.inner.invoke(call)
    }

    fn broadcast(&self, call: BrokerCall) -> Result<BrokerReply, BrokerError> {
        if !call.request.is_implicit() {
            return self.redirect(ComponentKind::Listener, call);
        }

        let delivery = self.broadcaster.deliver(&call.request);
        if call.request.ordered && delivery.result.aborted {
            debug!(method = %call.method, "broadcast aborted by patch listener, host not notified");
            return Ok(BrokerReply::Broadcast(delivery.result));
        }

        let patch_reached = delivery.delivered + delivery.failed > 0;
        match self.inner.invoke(call)? {
            BrokerReply::Broadcast(host) => Ok(BrokerReply::Broadcast(host)),
            _ if patch_reached => Ok(BrokerReply::Broadcast(delivery.result)),
            other => Ok(other),
        }
    }
}

impl ServiceBroker for ForgeServiceBroker {
    fn invoke(&self, call: BrokerCall) -> Result<BrokerReply, BrokerError> {
        match self.handler_for(&call.method) {
            CallHandler::PassThrough => self.inner.invoke(call),
            CallHandler::RedirectService => self.redirect(ComponentKind::Service, call),
            CallHandler::RedirectBroadcast => self.broadcast(call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComponentDecl, DispatchRequest, REDIRECT_MARKER_KEY};
    use crate::impls::StaticComponentFactory;
    use crate::placeholder::{ListenerCache, PlaceholderNames};
    use crate::registry::ComponentRegistry;
    use crate::testing::{
        RecordingListener, RecordingServiceBroker, host_with_placeholders, identity,
        patch_with_components,
    };
    use parking_lot::Mutex;

    struct Fixture {
        broker: ForgeServiceBroker,
        inner: Arc<RecordingServiceBroker>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn fixture(abort: bool) -> Fixture {
        let registry = Arc::new(ComponentRegistry::new());
        registry.init_with(
            &host_with_placeholders(vec![
                ComponentDecl::new(ComponentKind::Service, "app.HostService"),
                ComponentDecl::new(ComponentKind::Listener, "app.HostListener")
                    .with_filter("SYNC", 100),
            ]),
            Some(&patch_with_components("1.0.1", 2)),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener_log = log.clone();
        let factory = Arc::new(StaticComponentFactory::new().with_listener("patch.OnSync", move || {
            let listener = RecordingListener::new(5).logging_to(listener_log.clone());
            if abort {
                Arc::new(listener.aborting())
            } else {
                Arc::new(listener)
            }
        }));
        let broadcaster = Arc::new(ImplicitBroadcaster::new(
            registry.clone(),
            Arc::new(ListenerCache::new(factory)),
            identity("host"),
        ));
        let inner = Arc::new(RecordingServiceBroker::default());
        Fixture {
            broker: ForgeServiceBroker::new(
                inner.clone(),
                Router::new(registry, PlaceholderNames::default()),
                broadcaster,
            ),
            inner,
            log,
        }
    }

    fn call(method: BrokerMethod, request: DispatchRequest) -> BrokerCall {
        BrokerCall::new(method, request)
    }

    #[test]
    fn host_service_passes_through() {
        let f = fixture(false);
        let request = DispatchRequest::explicit("app.HostService");
        let reply = f
            .broker
            .invoke(call(BrokerMethod::StartService, request.clone()))
            .unwrap();
        assert_eq!(reply, BrokerReply::Accepted);
        assert_eq!(f.inner.calls.lock()[0].request, request);
    }

    #[test]
    fn patch_service_is_redirected_to_placeholder() {
        let f = fixture(false);
        f.broker
            .invoke(call(
                BrokerMethod::BindService,
                DispatchRequest::explicit("patch.SyncService"),
            ))
            .unwrap();

        let calls = f.inner.calls.lock();
        assert_eq!(calls[0].request.target.as_deref(), Some("forge.placeholder.Service"));
        assert_eq!(
            calls[0].request.extras.get(REDIRECT_MARKER_KEY).map(String::as_str),
            Some("patch.SyncService")
        );
    }

    #[test]
    fn unknown_service_is_dropped() {
        let f = fixture(false);
        let reply = f
            .broker
            .invoke(call(
                BrokerMethod::StartService,
                DispatchRequest::explicit("nowhere.Service"),
            ))
            .unwrap();
        assert_eq!(reply, BrokerReply::Dropped);
        assert!(f.inner.calls.lock().is_empty());
    }

    #[test]
    fn explicit_broadcast_goes_to_listener_placeholder() {
        let f = fixture(false);
        f.broker
            .invoke(call(
                BrokerMethod::SendBroadcast,
                DispatchRequest::explicit("patch.OnSync"),
            ))
            .unwrap();
        assert_eq!(
            f.inner.calls.lock()[0].request.target.as_deref(),
            Some("forge.placeholder.Listener")
        );
        assert!(f.log.lock().is_empty());
    }

    #[test]
    fn implicit_broadcast_reaches_patch_and_host() {
        let f = fixture(false);
        let reply = f
            .broker
            .invoke(call(BrokerMethod::SendBroadcast, DispatchRequest::implicit("SYNC")))
            .unwrap();

        assert_eq!(*f.log.lock(), vec!["patch.OnSync"]);
        assert_eq!(f.inner.calls.lock().len(), 1);
        assert!(matches!(reply, BrokerReply::Broadcast(_)));
    }

    #[test]
    fn ordered_abort_keeps_broadcast_in_process() {
        let f = fixture(true);
        let reply = f
            .broker
            .invoke(call(
                BrokerMethod::SendBroadcast,
                DispatchRequest::implicit("SYNC").ordered(),
            ))
            .unwrap();

        assert!(f.inner.calls.lock().is_empty());
        let BrokerReply::Broadcast(result) = reply else {
            panic!("expected broadcast reply");
        };
        assert_eq!(result.code, 5);
    }

    #[test]
    fn unlisted_methods_pass_through() {
        let f = fixture(false);
        let method = BrokerMethod::from_name("getRunningServices");
        assert_eq!(f.broker.handler_for(&method), CallHandler::PassThrough);
        f.broker
            .invoke(call(method, DispatchRequest::explicit("nowhere.Service")))
            .unwrap();
        assert_eq!(f.inner.calls.lock().len(), 1);
    }

    #[test]
    fn register_receiver_is_not_intercepted() {
        let f = fixture(false);
        assert_eq!(
            f.broker.handler_for(&BrokerMethod::RegisterReceiver),
            CallHandler::PassThrough
        );
    }
}
