use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_MAX_MPS: usize = 1000;
const DEFAULT_NUM_WORKERS: usize = 1;
const DEFAULT_FLUSH_SIZE: usize = 50;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(20);

/// Tuning knobs shared by every persister.
///
/// Durations are read as milliseconds, e.g. `PERSISTER_FLUSH_INTERVAL=5000`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersisterConfig {
    /// Upper bound on messages forwarded per second by the puller.
    pub max_mps: usize,
    /// Number of batch workers reading from the shared channel.
    pub num_workers: usize,
    /// A batch is flushed as soon as it holds this many distinct ids.
    pub flush_size: usize,
    /// Maximum time a non-empty batch waits before being flushed.
    #[serde(with = "millis")]
    pub flush_interval: Duration,
    /// Deadline for a single flush against the sink.
    #[serde(with = "millis")]
    pub flush_timeout: Duration,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            max_mps: DEFAULT_MAX_MPS,
            num_workers: DEFAULT_NUM_WORKERS,
            flush_size: DEFAULT_FLUSH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

impl PersisterConfig {
    pub fn from_env() -> Result<Self> {
        let config = envy::prefixed("PERSISTER_")
            .from_env::<Self>()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_mps == 0 {
            return Err(Error::Config("max_mps must be greater than 0".into()));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be greater than 0".into()));
        }
        if self.flush_size == 0 {
            return Err(Error::Config("flush_size must be greater than 0".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::Config("flush_interval must be greater than 0".into()));
        }
        if self.flush_timeout.is_zero() {
            return Err(Error::Config("flush_timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn with_max_mps(mut self, max_mps: usize) -> Self {
        self.max_mps = max_mps;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_flush_size(mut self, flush_size: usize) -> Self {
        self.flush_size = flush_size;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PersisterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_mps, 1000);
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.flush_size, 50);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.flush_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let cases = [
            PersisterConfig::default().with_max_mps(0),
            PersisterConfig::default().with_num_workers(0),
            PersisterConfig::default().with_flush_size(0),
            PersisterConfig::default().with_flush_interval(Duration::ZERO),
            PersisterConfig::default().with_flush_timeout(Duration::ZERO),
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_deserialize_partial_with_millis() {
        // given
        let vars = vec![
            ("NUM_WORKERS".to_string(), "4".to_string()),
            ("FLUSH_INTERVAL".to_string(), "250".to_string()),
        ];

        // when
        let config: PersisterConfig = envy::from_iter(vars).unwrap();

        // then
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.flush_size, DEFAULT_FLUSH_SIZE);
    }
}
