//! Platform port - capability-injection の継ぎ目
//!
//! プラットフォーム内部の dispatch broker を差し替える仕組みそのものは
//! プラットフォーム固有のアダプタが実装します。コアはこの trait だけに依存します。
//!
//! # 差し替え対象
//! - **LaunchBroker**: foreground コンポーネントの起動とインスタンス化
//! - **ServiceBroker**: service の start/bind/stop と broadcast の送信（メソッド名で呼び分け）
//! - **ProviderHost**: provider のインストールルーチン

use std::fmt;
use std::sync::Arc;

use crate::domain::{BroadcastResult, BrokerError, DispatchRequest, HookError};
use crate::ports::components::Launchable;

/// Foreground component broker.
pub trait LaunchBroker: Send + Sync {
    /// Outgoing launch request.
    fn start(&self, request: DispatchRequest) -> Result<(), BrokerError>;

    /// Instantiate the class the platform decided to launch.
    fn new_instance(&self, class_name: &str) -> Result<Box<dyn Launchable>, BrokerError>;
}

/// Method names understood by the background broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BrokerMethod {
    StartService,
    BindService,
    StopService,
    SendBroadcast,
    RegisterReceiver,
    Other(String),
}

impl BrokerMethod {
    pub fn from_name(name: &str) -> Self {
        match name {
            "startService" => BrokerMethod::StartService,
            "bindService" => BrokerMethod::BindService,
            "stopService" => BrokerMethod::StopService,
            "sendBroadcast" => BrokerMethod::SendBroadcast,
            "registerReceiver" => BrokerMethod::RegisterReceiver,
            other => BrokerMethod::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BrokerMethod::StartService => "startService",
            BrokerMethod::BindService => "bindService",
            BrokerMethod::StopService => "stopService",
            BrokerMethod::SendBroadcast => "sendBroadcast",
            BrokerMethod::RegisterReceiver => "registerReceiver",
            BrokerMethod::Other(name) => name,
        }
    }
}

impl fmt::Display for BrokerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One call through the background broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCall {
    pub method: BrokerMethod,
    pub request: DispatchRequest,
}

impl BrokerCall {
    pub fn new(method: BrokerMethod, request: DispatchRequest) -> Self {
        Self { method, request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerReply {
    Accepted,
    /// The call never reached the platform.
    Dropped,
    Broadcast(BroadcastResult),
}

/// Background component broker, keyed by method.
pub trait ServiceBroker: Send + Sync {
    fn invoke(&self, call: BrokerCall) -> Result<BrokerReply, BrokerError>;
}

/// Provider descriptor bound to the host package identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub authority: String,
    pub name: String,
    pub package: String,
}

/// The platform's own provider installation routine.
pub trait ProviderHost: Send + Sync {
    fn install_providers(&self, providers: &[ProviderDescriptor]) -> Result<(), BrokerError>;
}

/// PlatformHooks は broker の取得と差し替えを提供
///
/// # バージョン
/// - `api_level()` でアダプタが対象とするプラットフォーム API を示す
pub trait PlatformHooks: Send + Sync {
    fn api_level(&self) -> u32;

    fn current_launch_broker(&self) -> Result<Arc<dyn LaunchBroker>, HookError>;

    fn replace_launch_broker(&self, broker: Arc<dyn LaunchBroker>) -> Result<(), HookError>;

    fn current_service_broker(&self) -> Result<Arc<dyn ServiceBroker>, HookError>;

    fn replace_service_broker(&self, broker: Arc<dyn ServiceBroker>) -> Result<(), HookError>;

    fn provider_host(&self) -> Result<Arc<dyn ProviderHost>, HookError>;
}
