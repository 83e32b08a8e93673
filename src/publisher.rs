use crate::{EventEnvelope, MessageClientError, MessagePubClient, OutgoingMessage};
use std::sync::Arc;
use thiserror::Error;

pub const EVENT_TYPE_ATTRIBUTE: &str = "type";
pub const ENVIRONMENT_ATTRIBUTE: &str = "environment_id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagePublisherError {
    #[error("could not serialize event {id}: {reason}")]
    Serialize { id: String, reason: String },

    #[error(transparent)]
    Client(#[from] MessageClientError),
}

/// Publishes domain events so persisters can pick them up.
///
/// The envelope id is copied into the `id` attribute, which is what consumers
/// deduplicate on.
#[derive(Clone)]
pub struct EventPublisher {
    client: Arc<dyn MessagePubClient>,
}

impl EventPublisher {
    pub fn new(client: Arc<dyn MessagePubClient>) -> Self {
        Self { client }
    }

    pub async fn publish(&self, event: &EventEnvelope) -> Result<(), MessagePublisherError> {
        let message = outgoing(event)?;
        self.client.publish_message(message).await?;
        Ok(())
    }

    /// Publishes every event and returns one result per event, in order.
    pub async fn publish_many(
        &self,
        events: &[EventEnvelope],
    ) -> Vec<Result<(), MessagePublisherError>> {
        let mut results: Vec<Option<Result<(), MessagePublisherError>>> =
            Vec::with_capacity(events.len());
        let mut messages = Vec::with_capacity(events.len());
        for event in events {
            match outgoing(event) {
                Ok(message) => {
                    messages.push(message);
                    results.push(None);
                }
                Err(e) => {
                    log::error!("Failed to serialize event {:?}: {e}", event.id);
                    results.push(Some(Err(e)));
                }
            }
        }

        let mut published = self.client.publish_messages(messages).await.into_iter();
        results
            .into_iter()
            .map(|result| match result {
                Some(err) => err,
                None => published
                    .next()
                    .unwrap_or_else(|| {
                        Err(MessageClientError::Transient(
                            "missing publish result".to_string(),
                        ))
                    })
                    .map_err(MessagePublisherError::from),
            })
            .collect()
    }
}

fn outgoing(event: &EventEnvelope) -> Result<OutgoingMessage, MessagePublisherError> {
    let data = event
        .to_vec()
        .map_err(|e| MessagePublisherError::Serialize {
            id: event.id.clone(),
            reason: e.to_string(),
        })?;
    let mut message = OutgoingMessage::new(event.id.clone(), data);
    message
        .attributes
        .insert(EVENT_TYPE_ATTRIBUTE.to_string(), event.event_type.clone());
    message
        .attributes
        .insert(ENVIRONMENT_ATTRIBUTE.to_string(), event.environment_id.clone());
    Ok(message)
}
