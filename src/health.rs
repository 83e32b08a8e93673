use crate::GroupStatus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Healthy,
    Unhealthy,
}

/// Something a readiness or liveness probe can poll. Checks must not block.
pub trait HealthChecker: Send + Sync {
    fn check(&self) -> Status;
}

/// Liveness of a running worker group.
///
/// Workers are meant to run until shutdown, so a cancelled token or any finished
/// worker means the process should be restarted.
#[derive(Debug, Clone)]
pub struct Liveness {
    name: String,
    cln_token: CancellationToken,
    group: GroupStatus,
}

impl Liveness {
    pub fn new(name: impl Into<String>, cln_token: CancellationToken, group: GroupStatus) -> Self {
        Self {
            name: name.into(),
            cln_token,
            group,
        }
    }
}

impl HealthChecker for Liveness {
    fn check(&self) -> Status {
        if self.cln_token.is_cancelled() {
            log::error!("{} is unhealthy: shutting down", self.name);
            return Status::Unhealthy;
        }
        let finished = self.group.finished_count();
        if finished > 0 {
            log::error!(
                "{} is unhealthy: {finished} workers finished, exits {:?}",
                self.name,
                self.group.exits()
            );
            return Status::Unhealthy;
        }
        Status::Healthy
    }
}

/// Healthy only while every registered checker is.
#[derive(Default, Clone)]
pub struct HealthReporter {
    checkers: Vec<Arc<dyn HealthChecker>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker(&mut self, checker: Arc<dyn HealthChecker>) -> &mut Self {
        self.checkers.push(checker);
        self
    }
}

impl HealthChecker for HealthReporter {
    fn check(&self) -> Status {
        // every checker is polled so each one gets to log its own reason
        let unhealthy = self
            .checkers
            .iter()
            .filter(|checker| checker.check() == Status::Unhealthy)
            .count();
        if unhealthy > 0 {
            Status::Unhealthy
        } else {
            Status::Healthy
        }
    }
}
