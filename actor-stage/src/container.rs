//! Managed container integration.
//!
//! When a stage runs inside a dependency container, start registers an
//! extra provider whose pre-activation hook hands the container to every
//! actor before its first use. A failing injection fails the activation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::actor::{Actor, ActorContext};
use crate::error::ActorError;
use crate::provider::StageProvider;
use crate::sync::{read, write};

/// Dependency container consulted by actors during injection.
pub trait Container: Send + Sync + fmt::Debug {
    /// Look up a dependency by key.
    fn resolve(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl<'a> dyn Container + 'a {
    /// Look up a dependency and downcast it.
    pub fn resolve_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.resolve(key)?.downcast::<T>().ok()
    }
}

/// Simple keyed container.
#[derive(Default)]
pub struct MapContainer {
    entries: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl MapContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency under `key`, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        write(&self.entries).insert(key.into(), Arc::new(value));
    }
}

impl fmt::Debug for MapContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = read(&self.entries);
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("MapContainer").field("keys", &keys).finish()
    }
}

impl Container for MapContainer {
    fn resolve(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        read(&self.entries).get(key).cloned()
    }
}

/// Provider injecting the container into actors before activation.
#[derive(Debug)]
pub(crate) struct ContainerLifetime {
    container: Arc<dyn Container>,
}

impl ContainerLifetime {
    pub(crate) fn new(container: Arc<dyn Container>) -> Self {
        Self { container }
    }
}

#[async_trait]
impl StageProvider for ContainerLifetime {
    fn name(&self) -> &str {
        "container-lifetime"
    }

    async fn pre_activation(
        &self,
        actor: &mut dyn Actor,
        _ctx: &ActorContext,
    ) -> Result<(), ActorError> {
        actor.inject(self.container.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_as_downcasts() {
        let container = MapContainer::new();
        container.insert("greeting", String::from("hello"));

        let container: Arc<dyn Container> = Arc::new(container);
        let greeting = container
            .resolve_as::<String>("greeting")
            .expect("greeting should resolve");
        assert_eq!(greeting.as_str(), "hello");
    }

    #[test]
    fn test_resolve_as_wrong_type() {
        let container = MapContainer::new();
        container.insert("answer", 42u32);

        let container: Arc<dyn Container> = Arc::new(container);
        assert!(container.resolve_as::<String>("answer").is_none());
        assert!(container.resolve_as::<u32>("missing").is_none());
    }
}
