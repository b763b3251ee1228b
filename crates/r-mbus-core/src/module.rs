//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message bus core: registry, queues, and fan-out."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::sync::Arc;

use r_mbus_msg::Message;

/// A module attached to the bus.
///
/// The bus treats every module polymorphically through this capability and
/// never inspects its internals. Construction and destruction are the
/// host's concern (factories and `Drop`); the bus only delivers.
///
/// `receive` is called from the module's dedicated worker thread, one
/// message at a time, in queue order. It must not call
/// [`MessageBus::remove_module`](crate::MessageBus::remove_module) for the
/// receiving module itself, since removal joins this very thread.
pub trait BusModule: Send + Sync {
    /// Deliver one message to the module.
    fn receive(&self, message: &Message);
}

/// Shared handle to a registered module.
///
/// The `Arc` pointer is the module's identity on the bus: skip-source
/// matching during publish and lookup during removal both compare with
/// [`Arc::ptr_eq`].
pub type SharedModule = Arc<dyn BusModule>;
