use crate::Outcome;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

const CODE_LABEL: &str = "code";

// counters (the `_total` suffix is added by the client library)
const RECEIVED_TOTAL: &str = "received";
const HANDLED_TOTAL: &str = "handled";
const FLUSH_DURATION: &str = "flush_duration_seconds";

/// Counters for one persister, registered into a registry owned by the caller.
///
/// Cloning shares the underlying metrics, so every worker of a persister reports into
/// the same series.
#[derive(Clone, Debug)]
pub struct PersisterMetrics {
    received: Counter,
    handled: Family<Vec<(String, String)>, Counter>,
    flush_duration: Histogram,
}

impl PersisterMetrics {
    /// Registers the metrics under a sub-registry prefixed with `persister`.
    pub fn new(registry: &mut Registry, persister: &str) -> Self {
        let metrics = Self::unregistered();
        let sub_registry = registry.sub_registry_with_prefix(persister);
        sub_registry.register(
            RECEIVED_TOTAL,
            "Total number of messages received from the puller",
            metrics.received.clone(),
        );
        sub_registry.register(
            HANDLED_TOTAL,
            "Total number of settled messages by outcome code",
            metrics.handled.clone(),
        );
        sub_registry.register(
            FLUSH_DURATION,
            "Time taken to flush a batch to the sink",
            metrics.flush_duration.clone(),
        );
        metrics
    }

    /// Metrics that are recorded but not exported anywhere.
    pub fn unregistered() -> Self {
        Self {
            received: Counter::default(),
            handled: Family::default(),
            flush_duration: Histogram::new(exponential_buckets(0.005, 2.0, 14)),
        }
    }

    pub(crate) fn record_received(&self) {
        self.received.inc();
    }

    pub(crate) fn record_handled(&self, outcome: Outcome) {
        self.handled.get_or_create(&code_labels(outcome)).inc();
    }

    pub(crate) fn observe_flush(&self, elapsed: Duration) {
        self.flush_duration.observe(elapsed.as_secs_f64());
    }

    pub fn received_count(&self) -> u64 {
        self.received.get()
    }

    pub fn handled_count(&self, outcome: Outcome) -> u64 {
        self.handled.get_or_create(&code_labels(outcome)).get()
    }
}

fn code_labels(outcome: Outcome) -> Vec<(String, String)> {
    vec![(CODE_LABEL.to_string(), outcome.as_str().to_string())]
}
