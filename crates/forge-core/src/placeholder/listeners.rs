//! Listener instance cache shared by implicit broadcast delivery and the
//! listener placeholder.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ports::{ComponentFactory, Listener};

/// One instance per qualified name, created on first dispatch.
pub struct ListenerCache {
    factory: Arc<dyn ComponentFactory>,
    instances: Mutex<HashMap<String, Arc<dyn Listener>>>,
}

impl ListenerCache {
    pub fn new(factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            factory,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Cached instance, or a new one from the factory. `None` if unresolvable.
    pub fn get_or_create(&self, name: &str) -> Option<Arc<dyn Listener>> {
        let mut instances = self.instances.lock();
        if let Some(listener) = instances.get(name) {
            return Some(listener.clone());
        }
        let listener = self.factory.listener(name)?;
        instances.insert(name.to_string(), listener.clone());
        Some(listener)
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
