use crate::{BatchSink, DomainEvent, EnvironmentEvent, FailureMap, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditLog {
    pub id: String,
    pub environment_id: String,
    pub timestamp: DateTime<Utc>,
    pub entity_type: String,
    pub entity_id: String,
    pub editor: String,
    pub data: serde_json::Value,
}

/// Per-row failure reported by an [AuditLogStorage].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditLogStorageError {
    #[error("audit log already exists")]
    AlreadyExists,

    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("invalid audit log: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait AuditLogStorage: Send + Sync {
    /// Inserts `logs` and returns the ids of the rows that failed. An `Err` means the
    /// whole call failed.
    async fn create_audit_logs(
        &self,
        environment_id: &str,
        logs: Vec<AuditLog>,
    ) -> Result<HashMap<String, AuditLogStorageError>, SinkError>;
}

/// Persists audit-log events. Rows that already exist count as written, so redelivered
/// events are harmless.
pub struct AuditLogSink {
    storage: Arc<dyn AuditLogStorage>,
}

impl AuditLogSink {
    pub fn new(storage: Arc<dyn AuditLogStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl BatchSink for AuditLogSink {
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
        let mut logs = Vec::with_capacity(events.len());
        for (id, event) in events {
            match event.event {
                DomainEvent::AuditLog(audit) => logs.push(AuditLog {
                    id,
                    environment_id: event.environment_id,
                    timestamp: event.timestamp,
                    entity_type: audit.entity_type,
                    entity_id: audit.entity_id,
                    editor: audit.editor,
                    data: audit.data,
                }),
                other => {
                    log::error!("Unexpected event {id:?} for audit logs: {other:?}");
                    failures.insert(id, false);
                }
            }
        }
        if logs.is_empty() {
            return Ok(failures);
        }

        let errors = self.storage.create_audit_logs(partition, logs).await?;
        for (id, error) in errors {
            match error {
                AuditLogStorageError::AlreadyExists => {
                    log::debug!("Audit log {id:?} already exists");
                }
                AuditLogStorageError::Transient(reason) => {
                    log::warn!("Failed to create audit log {id:?}: {reason}");
                    failures.insert(id, true);
                }
                AuditLogStorageError::Invalid(reason) => {
                    log::error!("Dropping invalid audit log {id:?}: {reason}");
                    failures.insert(id, false);
                }
            }
        }
        Ok(failures)
    }
}
