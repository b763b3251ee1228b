//! ---
//! mbus_section: "02-messaging-ipc-data-model"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message entity and gateway wire codec."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use tracing::debug;

use crate::types::Message;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message handed to the bus by a producer.
    Published,
    /// Message clone handed to a module's receive operation.
    Delivered,
    /// Message clone discarded without reaching a module.
    Dropped,
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, message: &Message) {
    debug!(
        content_len = message.content().len(),
        properties = message.properties().len(),
        ref_count = message.ref_count(),
        direction = ?direction,
        "message activity"
    );
}

/// Prometheus metric handles for message activity.
pub struct MessageMetricsExporter {
    published: IntCounter,
    delivered: IntCounter,
    dropped: IntCounter,
    fanout: Histogram,
}

impl MessageMetricsExporter {
    /// Register message metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let published = IntCounter::with_opts(Opts::new(
            "messages_published_total",
            "Messages handed to the bus by producers",
        ))?;
        let delivered = IntCounter::with_opts(Opts::new(
            "message_clones_delivered_total",
            "Message clones enqueued for module consumption",
        ))?;
        let dropped = IntCounter::with_opts(Opts::new(
            "message_clones_dropped_total",
            "Message clones discarded before reaching a module",
        ))?;
        let fanout = Histogram::with_opts(HistogramOpts::new(
            "message_fanout_size",
            "Clones produced per publish call",
        ))?;

        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(delivered.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(fanout.clone()))?;

        Ok(Self {
            published,
            delivered,
            dropped,
            fanout,
        })
    }

    /// Record a published message.
    pub fn observe_published(&self) {
        self.published.inc();
    }

    /// Record a delivered clone.
    pub fn observe_delivered(&self) {
        self.delivered.inc();
    }

    /// Record a dropped clone.
    pub fn observe_dropped(&self) {
        self.dropped.inc();
    }

    /// Record how many clones a publish call produced.
    pub fn observe_fanout(&self, clones: usize) {
        self.fanout.observe(clones as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Properties;

    #[test]
    fn metrics_exporter_records_counts() {
        let registry = Registry::new();
        let metrics = MessageMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_published();
        metrics.observe_delivered();
        metrics.observe_dropped();
        metrics.observe_fanout(3);

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "messages_published_total"));
    }

    #[test]
    fn log_message_accepts_every_direction() {
        let message = Message::new("ping", Properties::new());
        log_message(MessageDirection::Published, &message);
        log_message(MessageDirection::Delivered, &message);
        log_message(MessageDirection::Dropped, &message);
    }
}
