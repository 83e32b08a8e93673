use crate::{Batch, BatchSink, Dispatcher, MessageReceiver, Outcome, PersisterMetrics, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// One batching loop over the shared message channel.
///
/// The batch is owned by this worker alone, so ids are only deduplicated against other
/// messages this worker collected since its last flush.
pub struct BatchWorker<S: BatchSink> {
    rx: MessageReceiver,
    dispatcher: Arc<Dispatcher<S>>,
    flush_size: usize,
    flush_interval: Duration,
    metrics: PersisterMetrics,
}

impl<S: BatchSink> BatchWorker<S> {
    pub fn new(
        rx: MessageReceiver,
        dispatcher: Arc<Dispatcher<S>>,
        flush_size: usize,
        flush_interval: Duration,
        metrics: PersisterMetrics,
    ) -> Self {
        Self {
            rx,
            dispatcher,
            flush_size,
            flush_interval,
            metrics,
        }
    }

    /// Collects until the batch is full or `flush_interval` passes since the last flush.
    ///
    /// On cancellation, or once the channel is closed, whatever is still in the batch
    /// gets one last flush before returning.
    pub async fn run(self, cln_token: CancellationToken) -> Result<()> {
        let mut batch = Batch::new();
        let timer = time::sleep(self.flush_interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    let Some(message) = received else {
                        log::info!("Message channel closed, batch size {}", batch.len());
                        if !batch.is_empty() {
                            self.dispatcher.flush(batch.take()).await;
                        }
                        return Ok(());
                    };
                    self.metrics.record_received();

                    if message.id().is_empty() {
                        log::warn!("Message without id: {message:?}");
                        message.ack().await;
                        self.metrics.record_handled(Outcome::MissingId);
                        continue;
                    }
                    if let Some(previous) = batch.insert(message) {
                        log::warn!("Message with duplicate id {:?}", previous.id());
                        previous.ack().await;
                        self.metrics.record_handled(Outcome::DuplicateId);
                    }
                    if batch.len() < self.flush_size {
                        continue;
                    }
                    self.dispatcher.flush(batch.take()).await;
                    timer.as_mut().reset(Instant::now() + self.flush_interval);
                }
                _ = &mut timer => {
                    if !batch.is_empty() {
                        self.dispatcher.flush(batch.take()).await;
                    }
                    timer.as_mut().reset(Instant::now() + self.flush_interval);
                }
                _ = cln_token.cancelled() => {
                    let batch_size = batch.len();
                    log::info!("Worker cancelled, batch size {batch_size}");
                    if batch_size > 0 {
                        let report = self.dispatcher.flush(batch.take()).await;
                        log::info!(
                            "Flushed the {batch_size} remaining messages, {} retried",
                            report.count(Outcome::RepeatableError)
                        );
                    }
                    return Ok(());
                }
            }
        }
    }
}
