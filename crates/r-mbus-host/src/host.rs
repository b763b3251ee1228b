//! ---
//! mbus_section: "04-configuration-orchestration"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Configuration-driven module hosting layer."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::sync::Arc;

use r_mbus_common::HostConfig;
use r_mbus_core::{MessageBus, SharedModule};
use r_mbus_msg::{log_message, Message, MessageDirection, MessageMetricsExporter};
use tracing::{debug, error, info, warn};

use crate::factory::FactoryRegistry;
use crate::{HostError, Result};

/// A running set of hosted modules attached to one bus.
///
/// Start order is configuration file order; shutdown removes modules in
/// reverse start order and drops each instance only after its removal, so
/// a module is never destroyed while its worker may still deliver to it.
pub struct ModuleHost {
    bus: MessageBus,
    modules: Vec<HostedModule>,
    metrics: Option<Arc<MessageMetricsExporter>>,
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field(
                "modules",
                &self.modules.iter().map(|m| &m.name).collect::<Vec<_>>(),
            )
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

struct HostedModule {
    name: String,
    module: SharedModule,
}

impl ModuleHost {
    /// Create every enabled configured module and register it with a fresh
    /// bus.
    ///
    /// Any failure (unknown kind, factory refusal, bus rejection) unwinds
    /// the modules already started, in reverse order, before returning.
    pub fn start(config: &HostConfig, factories: &FactoryRegistry) -> Result<Self> {
        let bus = MessageBus::new();
        let mut modules: Vec<HostedModule> = Vec::new();

        for (name, module_config) in &config.modules {
            if !module_config.enabled {
                debug!(module = %name, kind = %module_config.kind, "skipping disabled module");
                continue;
            }
            let outcome = factories
                .get(&module_config.kind)
                .ok_or_else(|| HostError::UnknownKind {
                    kind: module_config.kind.clone(),
                })
                .and_then(|factory| factory.create(&bus, name, &module_config.params))
                .and_then(|module| {
                    bus.add_module(Arc::clone(&module))?;
                    Ok(module)
                });
            match outcome {
                Ok(module) => {
                    info!(module = %name, kind = %module_config.kind, "module started");
                    modules.push(HostedModule {
                        name: name.clone(),
                        module,
                    });
                }
                Err(err) => {
                    error!(module = %name, kind = %module_config.kind, error = %err, "module failed to start");
                    Self::unwind(&bus, modules);
                    return Err(err);
                }
            }
        }

        info!(modules = modules.len(), "module host started");
        Ok(Self {
            bus,
            modules,
            metrics: None,
        })
    }

    fn unwind(bus: &MessageBus, mut modules: Vec<HostedModule>) {
        while let Some(hosted) = modules.pop() {
            if let Err(err) = bus.remove_module(&hosted.module) {
                warn!(module = %hosted.name, error = %err, "failed to unwind module");
            }
        }
    }

    /// Record publish activity against a Prometheus exporter.
    pub fn attach_metrics(&mut self, exporter: Arc<MessageMetricsExporter>) {
        self.metrics = Some(exporter);
    }

    /// The bus the hosted modules are attached to.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Look up a hosted module instance by configured name.
    pub fn module(&self, name: &str) -> Option<&SharedModule> {
        self.modules
            .iter()
            .find(|hosted| hosted.name == name)
            .map(|hosted| &hosted.module)
    }

    /// Hosted module names in start order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules
            .iter()
            .map(|hosted| hosted.name.as_str())
            .collect()
    }

    /// Publish a host-originated message to every hosted module.
    pub fn publish(&self, message: &Message) -> Result<()> {
        self.publish_inner(None, message, self.modules.len())
    }

    /// Publish on behalf of a hosted module; it is skipped during fan-out.
    pub fn publish_from(&self, name: &str, message: &Message) -> Result<()> {
        let source = self
            .module(name)
            .ok_or_else(|| HostError::UnknownModule {
                name: name.to_string(),
            })?
            .clone();
        self.publish_inner(Some(&source), message, self.modules.len().saturating_sub(1))
    }

    fn publish_inner(
        &self,
        source: Option<&SharedModule>,
        message: &Message,
        fanout: usize,
    ) -> Result<()> {
        log_message(MessageDirection::Published, message);
        if let Some(metrics) = &self.metrics {
            metrics.observe_published();
        }
        match self.bus.publish(source, message) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_fanout(fanout);
                    for _ in 0..fanout {
                        metrics.observe_delivered();
                    }
                }
                Ok(())
            }
            Err(err) => {
                log_message(MessageDirection::Dropped, message);
                if let Some(metrics) = &self.metrics {
                    metrics.observe_dropped();
                }
                Err(err.into())
            }
        }
    }

    /// Remove every module from the bus in reverse start order.
    ///
    /// Each instance is dropped only after its removal completes. Failures
    /// are logged and the walk continues; the first error is reported once
    /// the walk is done.
    pub fn shutdown(mut self) -> Result<()> {
        let mut first_error: Option<HostError> = None;
        while let Some(hosted) = self.modules.pop() {
            match self.bus.remove_module(&hosted.module) {
                Ok(()) => info!(module = %hosted.name, "module stopped"),
                Err(err) => {
                    warn!(module = %hosted.name, error = %err, "failed to stop module");
                    first_error.get_or_insert(err.into());
                }
            }
            drop(hosted.module);
        }
        info!("module host shutdown complete");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
