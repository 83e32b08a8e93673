use crate::{BatchSink, DomainEvent, EnvironmentEvent, FailureMap, ReasonType, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

pub const EVENT_COUNT_KEY: &str = "ec";
pub const USER_COUNT_KEY: &str = "uc";
pub const DEFAULT_VARIATION_ID: &str = "default";

// counts are bucketed by calendar day in UTC+9
const DAY_OFFSET_SECS: i64 = 9 * 60 * 60;
const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("counter store error: {0}")]
pub struct CounterStoreError(pub String);

/// Redis-like counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError>;

    /// Adds `member` to the unique-count set at `key`, returning 1 if it was new.
    async fn pf_add(&self, key: &str, member: &str) -> Result<i64, CounterStoreError>;
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError> {
        (**self).increment(key).await
    }

    async fn pf_add(&self, key: &str, member: &str) -> Result<i64, CounterStoreError> {
        (**self).pf_add(key, member).await
    }
}

/// Exact, process-local [CounterStore]. Handy for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counts: Mutex<HashMap<String, i64>>,
    members: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &str) -> i64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    pub fn unique_count(&self, key: &str) -> usize {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(HashSet::len)
            .unwrap_or_default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(key.to_string()).or_default();
        *count += 1;
        Ok(*count)
    }

    async fn pf_add(&self, key: &str, member: &str) -> Result<i64, CounterStoreError> {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        let added = members
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(i64::from(added))
    }
}

/// Counts evaluations and evaluating users per feature variation and day.
///
/// Events other than evaluations are accepted and ignored.
pub struct EvaluationCountSink<C> {
    store: C,
}

impl<C: CounterStore> EvaluationCountSink<C> {
    pub fn new(store: C) -> Self {
        Self { store }
    }

    async fn count(&self, event: &EnvironmentEvent) -> Result<(), CounterStoreError> {
        let DomainEvent::Evaluation(evaluation) = &event.event else {
            return Ok(());
        };
        let variation_id = if evaluation.reason == ReasonType::Client {
            DEFAULT_VARIATION_ID
        } else {
            evaluation.variation_id.as_str()
        };
        // the unique count is idempotent, so it goes before the plain increment
        let user_key = evaluation_count_key(
            USER_COUNT_KEY,
            &evaluation.feature_id,
            variation_id,
            &event.environment_id,
            event.timestamp,
        );
        self.store.pf_add(&user_key, &evaluation.user_id).await?;
        let event_key = evaluation_count_key(
            EVENT_COUNT_KEY,
            &evaluation.feature_id,
            variation_id,
            &event.environment_id,
            event.timestamp,
        );
        self.store.increment(&event_key).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: CounterStore> BatchSink for EvaluationCountSink<C> {
    type Event = EnvironmentEvent;

    fn partition_key(&self, event: &EnvironmentEvent) -> String {
        event.environment_id.clone()
    }

    async fn write(
        &self,
        partition: &str,
        events: HashMap<String, EnvironmentEvent>,
    ) -> Result<FailureMap, SinkError> {
        let mut failures = FailureMap::new();
        for (id, event) in &events {
            if let Err(e) = self.count(event).await {
                log::error!(
                    "Failed to count evaluation {id:?} in environment {partition:?}: {e}"
                );
                failures.insert(id.clone(), true);
            }
        }
        Ok(failures)
    }
}

/// `{environment}:{kind}:{day}:{feature}:{variation}`, where `day` is the unix time of
/// the start of the event's day in UTC+9. The environment segment is left out when
/// empty.
pub fn evaluation_count_key(
    kind: &str,
    feature_id: &str,
    variation_id: &str,
    environment_id: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let day = (timestamp.timestamp() + DAY_OFFSET_SECS).div_euclid(SECS_PER_DAY) * SECS_PER_DAY
        - DAY_OFFSET_SECS;
    let id = format!("{day}:{feature_id}:{variation_id}");
    if environment_id.is_empty() {
        format!("{kind}:{id}")
    } else {
        format!("{environment_id}:{kind}:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EvaluationEvent, GoalEvent};
    use chrono::TimeZone;

    fn evaluation(env: &str, user: &str, variation: &str, reason: ReasonType) -> EnvironmentEvent {
        EnvironmentEvent {
            id: format!("{env}-{user}"),
            environment_id: env.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            event: DomainEvent::Evaluation(EvaluationEvent {
                feature_id: "feature".to_string(),
                feature_version: 1,
                user_id: user.to_string(),
                variation_id: variation.to_string(),
                reason,
                tag: "web".to_string(),
            }),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment(&self, _key: &str) -> Result<i64, CounterStoreError> {
            Err(CounterStoreError("connection reset".into()))
        }

        async fn pf_add(&self, _key: &str, _member: &str) -> Result<i64, CounterStoreError> {
            Ok(1)
        }
    }

    #[test]
    fn test_key_uses_start_of_day_in_utc_plus_nine() {
        // 2024-03-01T20:00:00Z is already 2024-03-02 in UTC+9
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let day_start = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap().timestamp();

        let key = evaluation_count_key(EVENT_COUNT_KEY, "f", "v", "env", ts);

        assert_eq!(key, format!("env:ec:{day_start}:f:v"));
    }

    #[test]
    fn test_key_without_environment() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let day_start = Utc.with_ymd_and_hms(2024, 2, 29, 15, 0, 0).unwrap().timestamp();

        let key = evaluation_count_key(USER_COUNT_KEY, "f", "v", "", ts);

        assert_eq!(key, format!("uc:{day_start}:f:v"));
    }

    #[tokio::test]
    async fn test_counts_events_and_unique_users() {
        // given
        let store = Arc::new(InMemoryCounterStore::new());
        let sink = EvaluationCountSink::new(store.clone());
        let events = HashMap::from([
            ("1".to_string(), evaluation("env", "u1", "v1", ReasonType::Rule)),
            ("2".to_string(), evaluation("env", "u1", "v1", ReasonType::Rule)),
            ("3".to_string(), evaluation("env", "u2", "v1", ReasonType::Rule)),
        ]);
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        // when
        let failures = sink.write("env", events).await.unwrap();

        // then
        assert!(failures.is_empty());
        let ec = evaluation_count_key(EVENT_COUNT_KEY, "feature", "v1", "env", ts);
        let uc = evaluation_count_key(USER_COUNT_KEY, "feature", "v1", "env", ts);
        assert_eq!(store.count(&ec), 3);
        assert_eq!(store.unique_count(&uc), 2);
    }

    #[tokio::test]
    async fn test_client_reason_counts_default_variation() {
        // given
        let store = Arc::new(InMemoryCounterStore::new());
        let sink = EvaluationCountSink::new(store.clone());
        let events = HashMap::from([(
            "1".to_string(),
            evaluation("env", "u1", "v1", ReasonType::Client),
        )]);
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        // when
        sink.write("env", events).await.unwrap();

        // then
        let ec = evaluation_count_key(EVENT_COUNT_KEY, "feature", DEFAULT_VARIATION_ID, "env", ts);
        assert_eq!(store.count(&ec), 1);
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        // given
        let store = Arc::new(InMemoryCounterStore::new());
        let sink = EvaluationCountSink::new(store.clone());
        let goal = EnvironmentEvent {
            id: "g".to_string(),
            environment_id: "env".to_string(),
            timestamp: Utc::now(),
            event: DomainEvent::Goal(GoalEvent {
                goal_id: "goal".to_string(),
                user_id: "u1".to_string(),
                value: 1.0,
                tag: String::new(),
            }),
        };

        // when
        let failures = sink
            .write("env", HashMap::from([("g".to_string(), goal)]))
            .await
            .unwrap();

        // then
        assert!(failures.is_empty());
        assert!(store.counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_repeatable() {
        // given
        let sink = EvaluationCountSink::new(FailingStore);
        let events = HashMap::from([(
            "1".to_string(),
            evaluation("env", "u1", "v1", ReasonType::Rule),
        )]);

        // when
        let failures = sink.write("env", events).await.unwrap();

        // then
        assert_eq!(failures, HashMap::from([("1".to_string(), true)]));
    }

    #[test]
    fn test_partitions_by_environment() {
        let sink = EvaluationCountSink::new(InMemoryCounterStore::new());
        let event = evaluation("env-x", "u1", "v1", ReasonType::Rule);
        assert_eq!(sink.partition_key(&event), "env-x");
    }
}
