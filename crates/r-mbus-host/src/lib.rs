//! ---
//! mbus_section: "04-configuration-orchestration"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Configuration-driven module hosting layer."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! The hosting layer around the bus: builds modules from configuration via
//! registered factories, attaches them to the bus in file order, and tears
//! everything down in reverse order on shutdown. The bus itself never
//! creates or destroys modules; that contract starts and ends here.

pub mod factory;
pub mod host;

use r_mbus_core::BusError;

/// Shared result type for hosting operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Failures raised while starting, driving, or stopping hosted modules.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The configuration names a module kind no factory was registered for.
    #[error("no factory registered for module kind '{kind}'")]
    UnknownKind {
        /// The unmatched kind string from the configuration.
        kind: String,
    },
    /// A factory refused to create its module.
    #[error("module '{name}' failed to create: {reason}")]
    ModuleCreate {
        /// Configured module name.
        name: String,
        /// Factory-supplied failure description.
        reason: String,
    },
    /// A publish or lifecycle call names a module this host does not run.
    #[error("module '{name}' is not hosted")]
    UnknownModule {
        /// The unmatched module name.
        name: String,
    },
    /// An underlying bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl HostError {
    /// Convenience constructor for factory failures.
    pub fn module_create(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleCreate {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub use factory::{FactoryRegistry, ModuleFactory};
pub use host::ModuleHost;
