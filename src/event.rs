use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub const EVALUATION_EVENT: &str = "evaluation";
pub const GOAL_EVENT: &str = "goal";
pub const USER_EVENT: &str = "user";
pub const AUDIT_LOG_EVENT: &str = "audit_log";

/// Why a payload could not be turned into an event. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid event envelope: {0}")]
    InvalidEnvelope(String),

    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("invalid data for event type '{event_type}': {reason}")]
    InvalidData { event_type: String, reason: String },
}

/// Turns a raw payload into the event type a sink works with.
pub trait Decoder<E>: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<E, DecodeError>;
}

/// Wire format shared by publishers and persisters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub environment_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    // will assign an id, so be sure to clone if you intend to reuse the same event
    pub fn create<D: Serialize>(
        event_type: impl Into<String>,
        environment_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: &D,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            environment_id: environment_id.into(),
            timestamp,
            data: serde_json::to_value(data)?,
        })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(data).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserializes `data` into the concrete payload for this envelope's type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_value(self.data.clone()).map_err(|e| DecodeError::InvalidData {
            event_type: self.event_type.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonType {
    Target,
    Rule,
    Default,
    Client,
    OffVariation,
    Prerequisite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub feature_id: String,
    pub feature_version: i32,
    pub user_id: String,
    pub variation_id: String,
    pub reason: ReasonType,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub goal_id: String,
    pub user_id: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: String,
    #[serde(default)]
    pub source_id: String,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEvent {
    pub entity_type: String,
    pub entity_id: String,
    pub editor: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The event kinds the platform publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Evaluation(EvaluationEvent),
    Goal(GoalEvent),
    User(UserEvent),
    AuditLog(AuditLogEvent),
}

/// A decoded event together with the envelope fields sinks partition and key on.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentEvent {
    pub id: String,
    pub environment_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: DomainEvent,
}

type DecodeFn<E> = Box<dyn Fn(&EventEnvelope) -> Result<E, DecodeError> + Send + Sync>;

/// Decodes envelopes by dispatching on their `type` field.
pub struct DecoderRegistry<E> {
    decoders: HashMap<String, DecodeFn<E>>,
}

impl<E> Default for DecoderRegistry<E> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<E> DecoderRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_decoder(
        &mut self,
        event_type: impl Into<String>,
        decoder: impl Fn(&EventEnvelope) -> Result<E, DecodeError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.decoders.insert(event_type.into(), Box::new(decoder));
        self
    }

    pub fn supports(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }
}

impl DecoderRegistry<EnvironmentEvent> {
    /// Registry for every [DomainEvent] kind.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .add_decoder(EVALUATION_EVENT, |envelope| {
                environment_event(envelope, DomainEvent::Evaluation(envelope.data_as()?))
            })
            .add_decoder(GOAL_EVENT, |envelope| {
                environment_event(envelope, DomainEvent::Goal(envelope.data_as()?))
            })
            .add_decoder(USER_EVENT, |envelope| {
                environment_event(envelope, DomainEvent::User(envelope.data_as()?))
            })
            .add_decoder(AUDIT_LOG_EVENT, |envelope| {
                environment_event(envelope, DomainEvent::AuditLog(envelope.data_as()?))
            });
        registry
    }
}

fn environment_event(
    envelope: &EventEnvelope,
    event: DomainEvent,
) -> Result<EnvironmentEvent, DecodeError> {
    Ok(EnvironmentEvent {
        id: envelope.id.clone(),
        environment_id: envelope.environment_id.clone(),
        timestamp: envelope.timestamp,
        event,
    })
}

impl<E> Decoder<E> for DecoderRegistry<E> {
    fn decode(&self, data: &[u8]) -> Result<E, DecodeError> {
        let envelope = EventEnvelope::from_slice(data)?;
        let decoder = self
            .decoders
            .get(&envelope.event_type)
            .ok_or_else(|| DecodeError::UnknownEventType(envelope.event_type.clone()))?;
        decoder(&envelope)
    }
}
