//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait はプラットフォームや永続化への依存を隠蔽し、
//! コアをテスト可能に保ちます。
//!
//! # 設計原則
//! - StateStore が再起動をまたぐ唯一の正本（source of truth）
//! - broker の差し替えは PlatformHooks 経由のみ
//! - コードのロードとインスタンス化は Loader / ComponentFactory に委譲

pub mod clock;
pub mod components;
pub mod id_generator;
pub mod loader;
pub mod optimizer;
pub mod platform;
pub mod state_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::components::{
    AppDelegate, Binding, ComponentFactory, ComponentFailure, ComponentIdentity, Launchable,
    Listener, Service,
};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::loader::{CodeLoader, Loaders, NativeLibraryLoader, ResourceLoader};
pub use self::optimizer::Optimizer;
pub use self::platform::{
    BrokerCall, BrokerMethod, BrokerReply, LaunchBroker, PlatformHooks, ProviderDescriptor,
    ProviderHost, ServiceBroker,
};
pub use self::state_store::{StateStore, StoreOp};
