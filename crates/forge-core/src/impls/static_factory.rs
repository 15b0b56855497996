//! StaticComponentFactory - 名前とコンストラクタの対応表による ComponentFactory
//!
//! 埋め込み側（またはテスト）がマージ済みコードユニットの型を
//! 名前付きで登録します。

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::{AppDelegate, ComponentFactory, Launchable, Listener, Service};

type Ctor<T> = Box<dyn Fn() -> T + Send + Sync>;

#[derive(Default)]
pub struct StaticComponentFactory {
    launchables: HashMap<String, Ctor<Box<dyn Launchable>>>,
    services: HashMap<String, Ctor<Box<dyn Service>>>,
    listeners: HashMap<String, Ctor<Arc<dyn Listener>>>,
    delegates: HashMap<String, Ctor<Arc<dyn AppDelegate>>>,
}

impl StaticComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launchable<F>(mut self, name: &str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn Launchable> + Send + Sync + 'static,
    {
        self.launchables.insert(name.to_string(), Box::new(ctor));
        self
    }

    pub fn with_service<F>(mut self, name: &str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn Service> + Send + Sync + 'static,
    {
        self.services.insert(name.to_string(), Box::new(ctor));
        self
    }

    pub fn with_listener<F>(mut self, name: &str, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn Listener> + Send + Sync + 'static,
    {
        self.listeners.insert(name.to_string(), Box::new(ctor));
        self
    }

    pub fn with_app_delegate<F>(mut self, name: &str, ctor: F) -> Self
    where
        F: Fn() -> Arc<dyn AppDelegate> + Send + Sync + 'static,
    {
        self.delegates.insert(name.to_string(), Box::new(ctor));
        self
    }
}

impl ComponentFactory for StaticComponentFactory {
    fn launchable(&self, name: &str) -> Option<Box<dyn Launchable>> {
        self.launchables.get(name).map(|ctor| ctor())
    }

    fn service(&self, name: &str) -> Option<Box<dyn Service>> {
        self.services.get(name).map(|ctor| ctor())
    }

    fn listener(&self, name: &str) -> Option<Arc<dyn Listener>> {
        self.listeners.get(name).map(|ctor| ctor())
    }

    fn app_delegate(&self, name: &str) -> Option<Arc<dyn AppDelegate>> {
        self.delegates.get(name).map(|ctor| ctor())
    }
}
