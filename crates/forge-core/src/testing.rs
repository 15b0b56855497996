//! Test fixtures shared across modules: manifests, fake components and a
//! recording platform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::artifact::ArtifactBundle;
use crate::domain::{
    BroadcastResult, BrokerError, ComponentDecl, ComponentKind, DispatchRequest, HookError,
    HostManifest, LaunchMode, PatchManifest, StoreError, VersionTag,
};
use crate::placeholder::{PlaceholderNames, PlaceholderRole};
use crate::ports::{
    Binding, BrokerCall, BrokerReply, ComponentFailure, ComponentIdentity, LaunchBroker,
    Launchable, Listener, PlatformHooks, ProviderDescriptor, ProviderHost, Service, ServiceBroker,
    StateStore, StoreOp,
};

pub const HOST_PACKAGE: &str = "com.example.host";
pub const HOST_SIGNER: &str = "3F:9A:11:C2";
pub const IDENTITY_TOKEN: u64 = 0xF0F0;

pub fn host_manifest(components: Vec<ComponentDecl>) -> HostManifest {
    HostManifest {
        package: HOST_PACKAGE.into(),
        signer: HOST_SIGNER.into(),
        version: VersionTag::new("1.0.0", 1),
        components,
    }
}

/// Host manifest that also declares every default placeholder.
pub fn host_with_placeholders(mut components: Vec<ComponentDecl>) -> HostManifest {
    let names = PlaceholderNames::default();
    for role in PlaceholderNames::roles() {
        let mut decl = ComponentDecl::new(role.kind(), names.for_role(role));
        if let PlaceholderRole::Launch(mode) = role {
            decl = decl.with_launch_mode(mode);
        }
        components.push(decl);
    }
    host_manifest(components)
}

pub fn patch_manifest(id: &str, code: u64) -> PatchManifest {
    PatchManifest {
        package: HOST_PACKAGE.into(),
        signer: HOST_SIGNER.into(),
        version: VersionTag::new(id, code),
        application: None,
        components: Vec::new(),
    }
}

/// A patch declaring one launchable, one service and one listener, none in the host.
pub fn patch_with_components(id: &str, code: u64) -> PatchManifest {
    let mut manifest = patch_manifest(id, code);
    manifest.components = vec![
        ComponentDecl::new(ComponentKind::Launchable, "patch.Detail")
            .with_launch_mode(LaunchMode::SingleTop),
        ComponentDecl::new(ComponentKind::Service, "patch.SyncService"),
        ComponentDecl::new(ComponentKind::Listener, "patch.OnSync").with_filter("SYNC", 5),
        ComponentDecl::new(ComponentKind::Provider, "patch.Notes")
            .with_authority("com.example.host.notes"),
    ];
    manifest
}

/// Write an artifact with one code unit and one native library to `dir/<id>.artifact`.
pub fn write_artifact(dir: &Path, manifest: PatchManifest) -> PathBuf {
    let path = dir.join(format!("{}-{}.artifact", manifest.version.id, manifest.version.code));
    ArtifactBundle::new(manifest)
        .with_entry("code/app.unit", b"unit")
        .with_entry("res/strings.txt", b"hello")
        .with_entry("lib/arm64/libnative.so", b"elf")
        .write_to(&path)
        .unwrap();
    path
}

/// Store that refuses any batch writing `rejected`; everything else lands in `inner`.
pub struct RejectingStore {
    pub inner: Arc<dyn StateStore>,
    pub rejected: &'static str,
}

impl RejectingStore {
    pub fn new(inner: Arc<dyn StateStore>, rejected: &'static str) -> Self {
        Self { inner, rejected }
    }
}

impl StateStore for RejectingStore {
    fn get(&self, ns: &str, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(ns, key)
    }

    fn keys(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(ns)
    }

    fn apply(&self, ns: &str, ops: &[StoreOp]) -> Result<(), StoreError> {
        let touches = ops
            .iter()
            .any(|op| matches!(op, StoreOp::Put { key, .. } if key == self.rejected));
        if touches {
            return Err(StoreError::Io {
                path: PathBuf::from("forge.json"),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.apply(ns, ops)
    }
}

pub fn identity(component: &str) -> ComponentIdentity {
    ComponentIdentity {
        package: HOST_PACKAGE.into(),
        process: HOST_PACKAGE.into(),
        component: component.into(),
        token: IDENTITY_TOKEN,
    }
}

#[derive(Default)]
pub struct TestLaunchable {
    identity: Option<ComponentIdentity>,
    pub created_with: Option<DispatchRequest>,
}

impl Launchable for TestLaunchable {
    fn attach(&mut self, identity: ComponentIdentity) {
        self.identity = Some(identity);
    }

    fn identity(&self) -> Option<&ComponentIdentity> {
        self.identity.as_ref()
    }

    fn on_create(&mut self, request: &DispatchRequest) -> Result<(), ComponentFailure> {
        self.created_with = Some(request.clone());
        Ok(())
    }
}

/// Binding token reports how many times the service was started.
#[derive(Default)]
pub struct RecordingService {
    identity: Option<ComponentIdentity>,
    starts: u64,
}

impl Service for RecordingService {
    fn attach(&mut self, identity: ComponentIdentity) {
        self.identity = Some(identity);
    }

    fn on_start(&mut self, _request: &DispatchRequest) -> Result<(), ComponentFailure> {
        self.starts += 1;
        Ok(())
    }

    fn on_bind(&mut self, _request: &DispatchRequest) -> Result<Binding, ComponentFailure> {
        let component = self
            .identity
            .as_ref()
            .map(|id| id.component.clone())
            .ok_or_else(|| ComponentFailure::new("not attached"))?;
        Ok(Binding {
            component,
            token: self.starts,
        })
    }
}

/// Sets `result.code`, appends its name to a shared log, optionally aborts or panics.
pub struct RecordingListener {
    code: i32,
    log: Arc<Mutex<Vec<String>>>,
    abort: bool,
    panic: bool,
}

impl RecordingListener {
    pub fn new(code: i32) -> Self {
        Self {
            code,
            log: Arc::new(Mutex::new(Vec::new())),
            abort: false,
            panic: false,
        }
    }

    pub fn logging_to(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    pub fn aborting(mut self) -> Self {
        self.abort = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }
}

impl Listener for RecordingListener {
    fn on_receive(
        &self,
        identity: &ComponentIdentity,
        _request: &DispatchRequest,
        result: &mut BroadcastResult,
    ) -> Result<(), ComponentFailure> {
        self.log.lock().push(identity.component.clone());
        if self.panic {
            panic!("listener {} exploded", identity.component);
        }
        result.code = self.code;
        if self.abort {
            result.aborted = true;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLaunchBroker {
    pub started: Mutex<Vec<DispatchRequest>>,
    pub instantiated: Mutex<Vec<String>>,
}

impl LaunchBroker for RecordingLaunchBroker {
    fn start(&self, request: DispatchRequest) -> Result<(), BrokerError> {
        self.started.lock().push(request);
        Ok(())
    }

    fn new_instance(&self, class_name: &str) -> Result<Box<dyn Launchable>, BrokerError> {
        self.instantiated.lock().push(class_name.to_string());
        Ok(Box::new(TestLaunchable::default()))
    }
}

#[derive(Default)]
pub struct RecordingServiceBroker {
    pub calls: Mutex<Vec<BrokerCall>>,
}

impl ServiceBroker for RecordingServiceBroker {
    fn invoke(&self, call: BrokerCall) -> Result<BrokerReply, BrokerError> {
        let reply = match call.method {
            crate::ports::BrokerMethod::SendBroadcast => {
                BrokerReply::Broadcast(BroadcastResult::default())
            }
            _ => BrokerReply::Accepted,
        };
        self.calls.lock().push(call);
        Ok(reply)
    }
}

#[derive(Default)]
pub struct RecordingProviderHost {
    pub installed: Mutex<Vec<ProviderDescriptor>>,
}

impl ProviderHost for RecordingProviderHost {
    fn install_providers(&self, providers: &[ProviderDescriptor]) -> Result<(), BrokerError> {
        self.installed.lock().extend_from_slice(providers);
        Ok(())
    }
}

/// In-memory platform whose broker slots can be swapped and inspected.
pub struct FakePlatform {
    pub api_level: u32,
    pub original_launch: Arc<RecordingLaunchBroker>,
    pub original_service: Arc<RecordingServiceBroker>,
    pub providers: Arc<RecordingProviderHost>,
    launch: Mutex<Arc<dyn LaunchBroker>>,
    service: Mutex<Arc<dyn ServiceBroker>>,
    pub fail_launch: bool,
    pub fail_service: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        let original_launch = Arc::new(RecordingLaunchBroker::default());
        let original_service = Arc::new(RecordingServiceBroker::default());
        Self {
            api_level: 34,
            launch: Mutex::new(original_launch.clone()),
            service: Mutex::new(original_service.clone()),
            original_launch,
            original_service,
            providers: Arc::new(RecordingProviderHost::default()),
            fail_launch: false,
            fail_service: false,
        }
    }

    pub fn launch_broker(&self) -> Arc<dyn LaunchBroker> {
        self.launch.lock().clone()
    }

    pub fn service_broker(&self) -> Arc<dyn ServiceBroker> {
        self.service.lock().clone()
    }
}

impl PlatformHooks for FakePlatform {
    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn current_launch_broker(&self) -> Result<Arc<dyn LaunchBroker>, HookError> {
        Ok(self.launch_broker())
    }

    fn replace_launch_broker(&self, broker: Arc<dyn LaunchBroker>) -> Result<(), HookError> {
        if self.fail_launch {
            return Err(HookError::Unsupported {
                broker: "launch",
                api_level: self.api_level,
            });
        }
        *self.launch.lock() = broker;
        Ok(())
    }

    fn current_service_broker(&self) -> Result<Arc<dyn ServiceBroker>, HookError> {
        Ok(self.service_broker())
    }

    fn replace_service_broker(&self, broker: Arc<dyn ServiceBroker>) -> Result<(), HookError> {
        if self.fail_service {
            return Err(HookError::Substitution {
                broker: "service",
                reason: "field not found".into(),
            });
        }
        *self.service.lock() = broker;
        Ok(())
    }

    fn provider_host(&self) -> Result<Arc<dyn ProviderHost>, HookError> {
        Ok(self.providers.clone())
    }
}
