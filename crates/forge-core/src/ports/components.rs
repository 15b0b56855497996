//! Component port - パッチのコードユニットが提供するコンポーネント
//!
//! マージ済みのコードユニットから qualified name でインスタンスを作る
//! [`ComponentFactory`] と、各 kind のライフサイクル trait を定義します。

use std::sync::Arc;

use thiserror::Error;

use crate::domain::{BroadcastResult, DispatchRequest};

/// コンポーネント実装が返す失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ComponentFailure(pub String);

impl ComponentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// プラットフォームがインスタンス化時に割り当てる識別フィールド
///
/// Placeholder は自分が受け取った値を本物のコンポーネントにコピーします。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub package: String,
    pub process: String,
    pub component: String,
    pub token: u64,
}

impl ComponentIdentity {
    /// component 名だけ差し替えたコピー
    pub fn for_component(&self, name: &str) -> Self {
        Self {
            component: name.to_string(),
            ..self.clone()
        }
    }
}

/// bind の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub component: String,
    pub token: u64,
}

/// Foreground component.
pub trait Launchable: Send {
    fn attach(&mut self, identity: ComponentIdentity);

    fn identity(&self) -> Option<&ComponentIdentity>;

    fn on_create(&mut self, request: &DispatchRequest) -> Result<(), ComponentFailure>;
}

/// Background component.
pub trait Service: Send {
    fn attach(&mut self, identity: ComponentIdentity);

    fn on_start(&mut self, request: &DispatchRequest) -> Result<(), ComponentFailure>;

    fn on_bind(&mut self, request: &DispatchRequest) -> Result<Binding, ComponentFailure>;

    fn on_destroy(&mut self) {}
}

/// Broadcast recipient.
///
/// Instances are cached per qualified name and reused across dispatches.
pub trait Listener: Send + Sync {
    fn on_receive(
        &self,
        identity: &ComponentIdentity,
        request: &DispatchRequest,
        result: &mut BroadcastResult,
    ) -> Result<(), ComponentFailure>;
}

/// Receives process lifecycle forwards on behalf of the patch.
pub trait AppDelegate: Send + Sync {
    fn on_startup(&self) {}

    fn on_low_memory(&self) {}

    fn on_trim(&self, _level: u32) {}
}

/// ComponentFactory はマージ済みコードユニットから名前でインスタンスを作る
///
/// 解決できない名前には `None` を返します。
pub trait ComponentFactory: Send + Sync {
    fn launchable(&self, name: &str) -> Option<Box<dyn Launchable>>;

    fn service(&self, name: &str) -> Option<Box<dyn Service>>;

    fn listener(&self, name: &str) -> Option<Arc<dyn Listener>>;

    fn app_delegate(&self, name: &str) -> Option<Arc<dyn AppDelegate>>;
}
