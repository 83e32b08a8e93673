use crate::{
    BatchSink, BatchWorker, Decoder, Dispatcher, Error, HealthChecker, Liveness,
    MessageSubClient, PersisterConfig, PersisterMetrics, RateLimitedPuller, Result, Status,
    WorkerGroup,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// A puller and a pool of batch workers feeding one sink.
///
/// `run` drives everything until shutdown; `stop` and `check` are meant to be called
/// concurrently from elsewhere, so a persister is usually shared behind an `Arc`.
pub struct Persister<S: BatchSink> {
    name: String,
    config: PersisterConfig,
    dispatcher: Arc<Dispatcher<S>>,
    metrics: PersisterMetrics,
    startup: Mutex<Option<(RateLimitedPuller, WorkerGroup)>>,
    liveness: Liveness,
    cln_token: CancellationToken,
    done: CancellationToken,
}

impl<S: BatchSink + 'static> Persister<S> {
    pub fn new(
        name: impl Into<String>,
        config: PersisterConfig,
        client: Arc<dyn MessageSubClient>,
        sink: Arc<S>,
        decoder: Arc<dyn Decoder<S::Event>>,
        metrics: PersisterMetrics,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let cln_token = CancellationToken::new();
        let group = WorkerGroup::new();
        let liveness = Liveness::new(name.clone(), cln_token.clone(), group.status());
        let dispatcher = Arc::new(Dispatcher::new(
            sink,
            decoder,
            config.flush_timeout,
            metrics.clone(),
        ));
        let puller = RateLimitedPuller::new(client, config.max_mps)?;

        Ok(Self {
            name,
            config,
            dispatcher,
            metrics,
            startup: Mutex::new(Some((puller, group))),
            liveness,
            cln_token,
            done: CancellationToken::new(),
        })
    }

    /// Runs the puller and `num_workers` batch workers until all of them return, and
    /// reports the first error. Can only be called once.
    pub async fn run(&self) -> Result<()> {
        let (puller, mut group) = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyStarted)?;
        let _done = self.done.clone().drop_guard();

        let rx = puller.message_receiver();
        group.spawn("puller", puller.run(self.cln_token.clone()));
        for i in 0..self.config.num_workers {
            let worker = BatchWorker::new(
                rx.clone(),
                Arc::clone(&self.dispatcher),
                self.config.flush_size,
                self.config.flush_interval,
                self.metrics.clone(),
            );
            group.spawn(format!("batch-worker-{i}"), worker.run(self.cln_token.clone()));
        }
        log::info!(
            "{} started with {} workers, {:?}",
            self.name,
            self.config.num_workers,
            self.config
        );

        let res = group.wait().await;
        // workers stop receiving on cancellation, so the channel can still hold messages
        let nacked = rx.nack_remaining().await;
        if nacked > 0 {
            log::info!("{} nacked {nacked} buffered messages", self.name);
        }
        log::info!("{} stopped", self.name);
        res
    }

    /// Cancels every worker and waits until `run` has returned, which includes the final
    /// flush of each worker's open batch and the nack of anything left in the channel. Returns right away if `run` was never called.
    pub async fn stop(&self) {
        self.cln_token.cancel();
        let started = self
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        if started {
            self.done.cancelled().await;
        }
    }
}

impl<S: BatchSink> HealthChecker for Persister<S> {
    fn check(&self) -> Status {
        self.liveness.check()
    }
}
