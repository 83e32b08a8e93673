use crate::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Why a worker task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Failed,
    Panicked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker: String,
    pub reason: ExitReason,
}

#[derive(Debug, Default)]
struct GroupState {
    finished: AtomicU32,
    failed: AtomicU32,
    exits: Mutex<Vec<WorkerExit>>,
}

impl GroupState {
    fn record(&self, worker: &str, result: &Result<()>) {
        let reason = match result {
            Ok(()) => ExitReason::Completed,
            Err(Error::Panicked { .. }) => ExitReason::Panicked,
            Err(Error::Cancelled { .. }) => ExitReason::Cancelled,
            Err(_) => ExitReason::Failed,
        };
        match result {
            Ok(()) => log::info!("Worker {worker:?} finished"),
            Err(e) => log::error!("Worker {worker:?} finished with error: {e}"),
        }

        self.exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WorkerExit {
                worker: worker.to_string(),
                reason,
            });
        if reason != ExitReason::Completed {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}

/// Read-only view of a [WorkerGroup] that stays valid after the group is consumed.
#[derive(Debug, Clone)]
pub struct GroupStatus {
    state: Arc<GroupState>,
}

impl GroupStatus {
    /// Number of workers that have stopped, for whatever reason.
    pub fn finished_count(&self) -> u32 {
        self.state.finished.load(Ordering::Acquire)
    }

    /// Number of workers that stopped with an error or a panic.
    pub fn failed_count(&self) -> u32 {
        self.state.failed.load(Ordering::Acquire)
    }

    pub fn exits(&self) -> Vec<WorkerExit> {
        self.state
            .exits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A set of named tasks that are awaited together.
///
/// Every task is counted exactly once when it stops. A panicking task is turned into
/// [Error::Panicked] instead of tearing down the process; the other tasks keep running.
/// Dropping the group aborts every task that is still running.
#[derive(Debug, Default)]
pub struct WorkerGroup {
    tasks: JoinSet<Result<()>>,
    state: Arc<GroupState>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            state: Arc::clone(&self.state),
        }
    }

    pub fn spawn<F>(&mut self, worker: impl Into<String>, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let worker = worker.into();
        let state = Arc::clone(&self.state);
        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(Error::Panicked {
                    worker: worker.clone(),
                    message: panic_message(payload),
                }),
            };
            state.record(&worker, &result);
            result
        });
    }

    /// Waits for every task and returns the first error, if any.
    pub async fn wait(mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(Error::Cancelled {
                    worker: e.to_string(),
                })
            });
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
