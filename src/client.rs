use crate::{Message, OutgoingMessage};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageClientError {
    // can be retried in a bit, like a network issue
    #[error("transient message client error: {0}")]
    Transient(String),

    // requires human intervention, like a config issue
    #[error("unrecoverable message client error: {0}")]
    Unrecoverable(String),
}

// This trait abstracts away message publishing. Implementations will need to know the
// concrete topic API; the payload is already serialized by the caller.
#[async_trait]
pub trait MessagePubClient: Send + Sync {
    async fn publish_message(&self, message: OutgoingMessage) -> Result<(), MessageClientError>;

    // default implementation in case concrete technologies don't allow batch publishing
    async fn publish_messages(
        &self,
        messages: Vec<OutgoingMessage>,
    ) -> Vec<Result<(), MessageClientError>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.publish_message(message).await);
        }
        results
    }
}

// This trait abstracts away message retrieval. Implementations will need to know the
// concrete subscription API. Every returned message carries its own acknowledger, so
// disposal happens through `Message::ack`/`Message::nack`.
#[async_trait]
pub trait MessageSubClient: Send + Sync {
    /// Returns the next chunk of delivered messages. An empty chunk means nothing was
    /// available within the implementation's wait time.
    async fn get_messages(&self) -> Result<Vec<Message>, MessageClientError>;
}

/// Reports the consumption outcome of a single delivery back to the bus.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, receipt: &str) -> Result<(), MessageClientError>;

    // in some concrete technologies this will not require any action
    async fn nack(&self, receipt: &str) -> Result<(), MessageClientError>;
}
