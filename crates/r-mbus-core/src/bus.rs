//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message bus core: registry, queues, and fan-out."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use r_mbus_msg::Message;
use tracing::{debug, trace, warn};

use crate::metrics::{BusCounters, BusMetrics};
use crate::module::SharedModule;
use crate::registration::Registration;
use crate::{BusError, Result};

/// Shared handle to a message bus.
///
/// Cloning the handle is a reference-count increment; dropping the last
/// clone tears the bus down, stopping any worker threads still attached
/// and discarding their queued messages. All registrations should normally
/// be removed before that point; the forced walk exists so nothing leaks
/// when they are not.
#[derive(Clone, Default)]
pub struct MessageBus {
    shared: Arc<BusShared>,
}

#[derive(Default)]
struct BusShared {
    /// Ordered registry; one bus-wide lock guards membership changes and
    /// publish iteration, so fan-out order is insertion order and no
    /// publish ever observes a half-updated registry.
    registry: Mutex<Vec<Arc<Registration>>>,
    counters: BusCounters,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module and start its worker thread.
    ///
    /// The registration (queue, lock, condition, quit flag) is built
    /// completely before it becomes reachable through the registry, and the
    /// worker is spawned only after insertion, so other threads never
    /// observe a partially initialized registration. On spawn failure the
    /// registration is taken back out and every resource unwinds.
    ///
    /// Registering the same module instance twice is rejected: the
    /// registry holds each instance at most once so removal and
    /// skip-source matching stay unambiguous.
    pub fn add_module(&self, module: SharedModule) -> Result<()> {
        let registration = Arc::new(Registration::new(module));
        {
            let mut registry = self.lock_registry()?;
            if registry
                .iter()
                .any(|existing| Arc::ptr_eq(existing.module(), registration.module()))
            {
                return Err(BusError::InvalidArgument("module is already registered"));
            }
            registry.push(Arc::clone(&registration));
        }

        let worker = Arc::clone(&registration);
        let spawned = thread::Builder::new()
            .name("r-mbus-worker".to_string())
            .spawn(move || worker.worker_loop());
        match spawned {
            Ok(handle) => {
                registration.attach_worker(handle);
                self.shared.counters.record_module_added();
                debug!(modules = self.module_count(), "module registered");
                Ok(())
            }
            Err(err) => {
                let mut registry = self
                    .shared
                    .registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                registry.retain(|existing| !Arc::ptr_eq(existing, &registration));
                Err(BusError::Spawn(err))
            }
        }
    }

    /// Remove a module, joining its worker and discarding queued messages.
    ///
    /// Blocks for at most one in-flight `receive` call. Must not be called
    /// from inside the removed module's own `receive`: the join would
    /// deadlock on the calling thread.
    ///
    /// If the module's channel lock is poisoned the quit/signal/join
    /// sequence is skipped and the worker is abandoned; the removal still
    /// completes and reports success. Known limitation carried over from
    /// the original design: the orphaned thread is leaked in preference to
    /// deadlocking the caller.
    pub fn remove_module(&self, module: &SharedModule) -> Result<()> {
        let registration = {
            let registry = self.lock_registry()?;
            registry
                .iter()
                .find(|existing| Arc::ptr_eq(existing.module(), module))
                .cloned()
        };
        let Some(registration) = registration else {
            return Err(BusError::ModuleNotFound);
        };

        if !registration.stop_worker() {
            warn!("channel lock poisoned; abandoning worker thread during removal");
        }
        let dropped = registration.drain();
        if dropped > 0 {
            self.shared.counters.record_dropped(dropped as u64);
            debug!(dropped, "discarded undelivered messages during removal");
        }

        let mut registry = self.lock_registry()?;
        registry.retain(|existing| !Arc::ptr_eq(existing, &registration));
        drop(registry);
        self.shared.counters.record_module_removed();
        debug!(modules = self.module_count(), "module removed");
        Ok(())
    }

    /// Fan a message out to every registered module except the source.
    ///
    /// Clones the message into each module's queue in registration order
    /// and wakes that module's worker. A failed enqueue aborts the rest of
    /// the fan-out: clones already queued stay queued (no rollback), the
    /// failed clone is dropped, and the error is returned. The registry
    /// lock is held across the iteration, serializing whole publish calls
    /// against each other and against add/remove, which is what makes each
    /// producer's clones appear in every queue in that producer's call
    /// order.
    pub fn publish(&self, source: Option<&SharedModule>, message: &Message) -> Result<()> {
        let registry = self.lock_registry()?;
        self.shared.counters.record_published();
        let mut clones = 0usize;
        for registration in registry.iter() {
            if let Some(source) = source {
                if Arc::ptr_eq(source, registration.module()) {
                    continue;
                }
            }
            if let Err(err) = registration.enqueue(message.clone()) {
                self.shared.counters.record_dropped(1);
                warn!(clones, "publish aborted; module channel unavailable");
                return Err(err);
            }
            clones += 1;
            self.shared.counters.record_delivered();
        }
        trace!(clones, "publish fan-out complete");
        Ok(())
    }

    /// Number of modules currently registered.
    pub fn module_count(&self) -> usize {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of the bus activity counters.
    pub fn metrics(&self) -> BusMetrics {
        self.shared.counters.snapshot()
    }

    fn lock_registry(&self) -> Result<std::sync::MutexGuard<'_, Vec<Arc<Registration>>>> {
        self.shared
            .registry
            .lock()
            .map_err(|_| BusError::Poisoned("registry lock"))
    }

    fn find_registration(&self, module: &SharedModule) -> Option<Arc<Registration>> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|existing| Arc::ptr_eq(existing.module(), module))
            .cloned()
    }

    /// Test support: flip a module's quit flag and wake its worker without
    /// joining it, so queued-but-undelivered states can be constructed.
    #[doc(hidden)]
    pub fn force_quit(&self, module: &SharedModule) -> bool {
        self.find_registration(module)
            .map(|registration| registration.force_quit())
            .unwrap_or(false)
    }

    /// Test support: poison a module's channel lock to exercise the
    /// degraded removal path.
    #[doc(hidden)]
    pub fn poison_channel(&self, module: &SharedModule) -> bool {
        match self.find_registration(module) {
            Some(registration) => {
                registration.poison_channel();
                true
            }
            None => false,
        }
    }

    /// Test support: depth of a module's delivery queue.
    #[doc(hidden)]
    pub fn queued_messages(&self, module: &SharedModule) -> Option<usize> {
        self.find_registration(module)
            .map(|registration| registration.queue_len())
    }
}

impl Drop for BusShared {
    fn drop(&mut self) {
        let registrations = match self.registry.get_mut() {
            Ok(registry) => std::mem::take(registry),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        if registrations.is_empty() {
            return;
        }
        warn!(
            remaining = registrations.len(),
            "bus dropped with modules still registered; forcing teardown"
        );
        for registration in registrations {
            if !registration.stop_worker() {
                warn!("channel lock poisoned; abandoning worker thread during teardown");
            }
            let dropped = registration.drain();
            if dropped > 0 {
                self.counters.record_dropped(dropped as u64);
                debug!(dropped, "discarded undelivered messages during teardown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_mbus_msg::{Message, Properties};
    use std::sync::mpsc::{channel, Sender};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Forwards received content over an mpsc channel so tests can block
    /// on delivery without sleeping.
    struct ForwardingModule {
        sender: StdMutex<Sender<Vec<u8>>>,
    }

    impl ForwardingModule {
        fn shared() -> (SharedModule, std::sync::mpsc::Receiver<Vec<u8>>) {
            let (sender, receiver) = channel();
            let module: SharedModule = Arc::new(Self {
                sender: StdMutex::new(sender),
            });
            (module, receiver)
        }
    }

    impl crate::BusModule for ForwardingModule {
        fn receive(&self, message: &Message) {
            let sender = self.sender.lock().expect("sender lock");
            let _ = sender.send(message.content().to_vec());
        }
    }

    struct SilentModule;

    impl crate::BusModule for SilentModule {
        fn receive(&self, _message: &Message) {}
    }

    fn silent_module() -> SharedModule {
        Arc::new(SilentModule)
    }

    #[test]
    fn add_and_remove_update_the_registry() {
        let bus = MessageBus::new();
        let first = silent_module();
        let second = silent_module();

        bus.add_module(first.clone()).expect("add first");
        bus.add_module(second.clone()).expect("add second");
        assert_eq!(bus.module_count(), 2);

        bus.remove_module(&first).expect("remove first");
        assert_eq!(bus.module_count(), 1);
        bus.remove_module(&second).expect("remove second");
        assert_eq!(bus.module_count(), 0);

        let metrics = bus.metrics();
        assert_eq!(metrics.modules_added, 2);
        assert_eq!(metrics.modules_removed, 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let bus = MessageBus::new();
        let module = silent_module();
        bus.add_module(module.clone()).expect("first add");
        assert!(matches!(
            bus.add_module(module.clone()),
            Err(BusError::InvalidArgument(_))
        ));
        assert_eq!(bus.module_count(), 1);
        bus.remove_module(&module).expect("remove");
    }

    #[test]
    fn removing_an_unknown_module_reports_not_found() {
        let bus = MessageBus::new();
        let module = silent_module();
        assert!(matches!(
            bus.remove_module(&module),
            Err(BusError::ModuleNotFound)
        ));
        assert_eq!(bus.module_count(), 0);
    }

    #[test]
    fn publish_reaches_every_module_except_the_source() {
        let bus = MessageBus::new();
        let (first, first_rx) = ForwardingModule::shared();
        let (second, second_rx) = ForwardingModule::shared();
        bus.add_module(first.clone()).expect("add first");
        bus.add_module(second.clone()).expect("add second");

        let message = Message::new("from-first", Properties::new());
        bus.publish(Some(&first), &message).expect("publish");

        let delivered = second_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("second module receives");
        assert_eq!(delivered, b"from-first");
        assert!(
            first_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "source module must not receive its own publication"
        );

        bus.remove_module(&first).expect("remove first");
        bus.remove_module(&second).expect("remove second");
    }

    #[test]
    fn host_publish_reaches_every_module() {
        let bus = MessageBus::new();
        let (first, first_rx) = ForwardingModule::shared();
        let (second, second_rx) = ForwardingModule::shared();
        bus.add_module(first.clone()).expect("add first");
        bus.add_module(second.clone()).expect("add second");

        let message = Message::new("broadcast", Properties::new());
        bus.publish(None, &message).expect("publish");

        for receiver in [&first_rx, &second_rx] {
            let delivered = receiver
                .recv_timeout(Duration::from_secs(5))
                .expect("module receives broadcast");
            assert_eq!(delivered, b"broadcast");
        }

        bus.remove_module(&first).expect("remove first");
        bus.remove_module(&second).expect("remove second");
    }

    #[test]
    fn worker_delivers_in_fifo_order() {
        let bus = MessageBus::new();
        let (module, receiver) = ForwardingModule::shared();
        bus.add_module(module.clone()).expect("add module");

        for index in 0..32u32 {
            let message = Message::new(index.to_be_bytes().to_vec(), Properties::new());
            bus.publish(None, &message).expect("publish");
        }
        for index in 0..32u32 {
            let delivered = receiver
                .recv_timeout(Duration::from_secs(5))
                .expect("delivery");
            assert_eq!(delivered, index.to_be_bytes());
        }

        bus.remove_module(&module).expect("remove");
    }

    #[test]
    fn publish_to_an_empty_bus_is_ok() {
        let bus = MessageBus::new();
        let message = Message::new("nobody-home", Properties::new());
        bus.publish(None, &message).expect("publish with no modules");
        assert_eq!(bus.metrics().delivered, 0);
    }
}
