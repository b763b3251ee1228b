//! ---
//! mbus_section: "04-configuration-orchestration"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Configuration-driven module hosting layer."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use r_mbus_core::{MessageBus, SharedModule};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::Result;

/// Builds module instances of one kind.
///
/// This is the create leg of the module contract: the factory receives the
/// bus handle (so the module can publish) and the opaque `params` value
/// from the configuration, and returns the instance the host will register.
pub trait ModuleFactory: Send + Sync {
    /// Create a module instance for the named configuration entry.
    fn create(&self, bus: &MessageBus, name: &str, params: &JsonValue) -> Result<SharedModule>;
}

impl<F> ModuleFactory for Arc<F>
where
    F: ModuleFactory + ?Sized,
{
    fn create(&self, bus: &MessageBus, name: &str, params: &JsonValue) -> Result<SharedModule> {
        (**self).create(bus, name, params)
    }
}

/// Factories keyed by the `kind` string used in configuration files.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Box<dyn ModuleFactory>>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a module kind, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, factory: Box<dyn ModuleFactory>) {
        let kind = kind.into();
        if self.factories.insert(kind.clone(), factory).is_some() {
            warn!(kind = %kind, "replacing previously registered module factory");
        }
    }

    /// Look up the factory for a kind.
    pub fn get(&self, kind: &str) -> Option<&dyn ModuleFactory> {
        self.factories.get(kind).map(Box::as_ref)
    }

    /// Kinds currently registered, for diagnostics.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_mbus_core::BusModule;
    use r_mbus_msg::Message;

    struct NullModule;

    impl BusModule for NullModule {
        fn receive(&self, _message: &Message) {}
    }

    struct NullFactory;

    impl ModuleFactory for NullFactory {
        fn create(
            &self,
            _bus: &MessageBus,
            _name: &str,
            _params: &JsonValue,
        ) -> Result<SharedModule> {
            Ok(Arc::new(NullModule))
        }
    }

    #[test]
    fn registered_factories_are_found_by_kind() {
        let mut registry = FactoryRegistry::new();
        registry.register("null", Box::new(NullFactory));
        assert!(registry.get("null").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.kinds(), ["null"]);
    }

    #[test]
    fn re_registration_replaces_the_factory() {
        let mut registry = FactoryRegistry::new();
        registry.register("null", Box::new(NullFactory));
        registry.register("null", Box::new(NullFactory));
        assert_eq!(registry.kinds().len(), 1);
    }
}
