//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message bus core: registry, queues, and fan-out."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! The message bus core.
//!
//! A [`MessageBus`] holds an ordered registry of modules. Every registered
//! module owns a private FIFO queue and one dedicated worker thread that
//! drains it into the module's receive operation. Publishing clones the
//! message into every queue except the publisher's own, so modules never
//! see their own publications and a slow consumer cannot block producers.

pub mod bus;
pub mod metrics;
pub mod module;

mod registration;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Failures surfaced by bus operations.
///
/// Every failure is a return value; the bus stays usable after an error.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The module handed to a removal or publish call is not registered.
    #[error("module is not registered with this bus")]
    ModuleNotFound,
    /// A lock or condition variable failed (a thread panicked while
    /// holding it).
    #[error("synchronization primitive failed: {0}")]
    Poisoned(&'static str),
    /// The per-module worker thread could not be spawned.
    #[error("worker thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
}

pub use bus::MessageBus;
pub use metrics::BusMetrics;
pub use module::{BusModule, SharedModule};
