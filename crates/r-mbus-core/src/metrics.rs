//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message bus core: registry, queues, and fan-out."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of bus activity used by dashboards and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusMetrics {
    /// Publish calls accepted by the bus.
    pub published: u64,
    /// Message clones enqueued to module queues.
    pub delivered: u64,
    /// Message clones discarded without reaching a module's receive
    /// operation (failed enqueue, removal drain, teardown drain).
    pub dropped: u64,
    /// Modules registered over the bus's lifetime.
    pub modules_added: u64,
    /// Modules removed over the bus's lifetime.
    pub modules_removed: u64,
}

impl BusMetrics {
    /// Modules currently registered.
    pub fn modules_active(&self) -> u64 {
        self.modules_added.saturating_sub(self.modules_removed)
    }
}

#[derive(Default)]
pub(crate) struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    modules_added: AtomicU64,
    modules_removed: AtomicU64,
}

impl BusCounters {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, clones: u64) {
        self.dropped.fetch_add(clones, Ordering::Relaxed);
    }

    pub(crate) fn record_module_added(&self) {
        self.modules_added.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_module_removed(&self) {
        self.modules_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            modules_added: self.modules_added.load(Ordering::Relaxed),
            modules_removed: self.modules_removed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_activity() {
        let counters = BusCounters::default();
        counters.record_published();
        counters.record_delivered();
        counters.record_delivered();
        counters.record_dropped(3);
        counters.record_module_added();
        counters.record_module_added();
        counters.record_module_removed();

        let metrics = counters.snapshot();
        assert_eq!(metrics.published, 1);
        assert_eq!(metrics.delivered, 2);
        assert_eq!(metrics.dropped, 3);
        assert_eq!(metrics.modules_active(), 1);
    }
}
