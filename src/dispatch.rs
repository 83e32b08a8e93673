use crate::{Batch, Decoder, Message, Outcome, PersisterMetrics};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};

/// Failed ids of a write, mapped to whether the failure is worth retrying. Ids that
/// are absent succeeded.
pub type FailureMap = HashMap<String, bool>;

/// A failure of a whole write call rather than of individual events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    // can be retried in a bit, like a network issue, so every event goes back on the bus
    #[error("transient sink error: {0}")]
    Transient(String),

    // retrying will not help, so every event is dropped
    #[error("unrecoverable sink error: {0}")]
    Unrecoverable(String),
}

impl SinkError {
    pub fn is_repeatable(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Destination of flushed batches: a database table, a cache, an external API.
///
/// Writes must be idempotent, since the same event can be delivered more than once.
#[async_trait]
pub trait BatchSink: Send + Sync {
    type Event: Send + Sync + 'static;

    /// Key events are grouped by before being written, e.g. the environment id. All
    /// events share one partition unless overridden.
    fn partition_key(&self, _event: &Self::Event) -> String {
        String::new()
    }

    async fn write(
        &self,
        partition: &str,
        events: HashMap<String, Self::Event>,
    ) -> Result<FailureMap, SinkError>;
}

/// Per-id outcomes of one flush.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    outcomes: HashMap<String, Outcome>,
}

impl FlushReport {
    fn record(&mut self, id: String, outcome: Outcome) {
        self.outcomes.insert(id, outcome);
    }

    pub fn outcome(&self, id: &str) -> Option<Outcome> {
        self.outcomes.get(id).copied()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.outcomes.len()
    }
}

/// Decodes a batch, writes it to the sink and settles every message from the result.
pub struct Dispatcher<S: BatchSink> {
    sink: Arc<S>,
    decoder: Arc<dyn Decoder<S::Event>>,
    flush_timeout: Duration,
    metrics: PersisterMetrics,
}

impl<S: BatchSink> Dispatcher<S> {
    pub fn new(
        sink: Arc<S>,
        decoder: Arc<dyn Decoder<S::Event>>,
        flush_timeout: Duration,
        metrics: PersisterMetrics,
    ) -> Self {
        Self {
            sink,
            decoder,
            flush_timeout,
            metrics,
        }
    }

    /// Settles every message of `batch` exactly once.
    ///
    /// The sink call runs under its own deadline rather than the caller's cancellation,
    /// so a draining worker still gets a definite answer. Hitting the deadline nacks
    /// everything that was sent.
    pub async fn flush(&self, batch: Batch) -> FlushReport {
        let start = Instant::now();
        let mut report = FlushReport::default();

        let mut pending = HashMap::with_capacity(batch.len());
        let mut partitions: HashMap<String, HashMap<String, S::Event>> = HashMap::new();
        for (id, message) in batch.into_messages() {
            match self.decoder.decode(message.data()) {
                Ok(event) => {
                    partitions
                        .entry(self.sink.partition_key(&event))
                        .or_default()
                        .insert(id.clone(), event);
                    pending.insert(id, message);
                }
                Err(e) => {
                    log::error!("Bad message {id:?}: {e}");
                    self.settle(&mut report, id, message, Outcome::BadMessage)
                        .await;
                }
            }
        }

        if pending.is_empty() {
            log::error!("All {} messages were bad", report.len());
            self.metrics.observe_flush(start.elapsed());
            return report;
        }

        let failures = match time::timeout(self.flush_timeout, self.write(partitions)).await {
            Ok(failures) => failures,
            Err(_) => {
                log::error!(
                    "Flush of {} messages timed out after {:?}",
                    pending.len(),
                    self.flush_timeout
                );
                pending.keys().map(|id| (id.clone(), true)).collect()
            }
        };

        for (id, message) in pending {
            let outcome = Outcome::from_failure(failures.get(&id).copied());
            if outcome == Outcome::NonRepeatableError {
                log::error!("Dropping message {id:?} after a non-repeatable sink error");
            }
            self.settle(&mut report, id, message, outcome).await;
        }

        self.metrics.observe_flush(start.elapsed());
        log::debug!(
            "Flushed {} messages in {}ms",
            report.len(),
            start.elapsed().as_millis()
        );
        report
    }

    async fn write(&self, partitions: HashMap<String, HashMap<String, S::Event>>) -> FailureMap {
        let mut failures = FailureMap::new();
        for (partition, events) in partitions {
            let ids: Vec<String> = events.keys().cloned().collect();
            match self.sink.write(&partition, events).await {
                Ok(fs) => failures.extend(fs),
                Err(e) => {
                    log::error!(
                        "Could not write {} events to partition {partition:?}: {e}",
                        ids.len()
                    );
                    let repeatable = e.is_repeatable();
                    failures.extend(ids.into_iter().map(|id| (id, repeatable)));
                }
            }
        }
        failures
    }

    async fn settle(&self, report: &mut FlushReport, id: String, message: Message, outcome: Outcome) {
        if outcome.is_retried() {
            message.nack().await;
        } else {
            message.ack().await;
        }
        self.metrics.record_handled(outcome);
        report.record(id, outcome);
    }
}
