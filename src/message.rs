use crate::Acknowledger;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Attribute carrying the producer-assigned event id that batches dedupe on.
pub const ID_ATTRIBUTE: &str = "id";

/// A single delivery pulled from a subscription.
///
/// `ack` and `nack` consume the message, so every delivery is settled at most once.
/// A message dropped without being settled is redelivered by the bus once its ack
/// deadline passes.
pub struct Message {
    receipt: String,
    attributes: HashMap<String, String>,
    data: Bytes,
    acknowledger: Arc<dyn Acknowledger>,
}

impl Message {
    pub fn new(
        receipt: impl Into<String>,
        attributes: HashMap<String, String>,
        data: impl Into<Bytes>,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            receipt: receipt.into(),
            attributes,
            data: data.into(),
            acknowledger,
        }
    }

    /// The event id from the `id` attribute, or an empty string when it is absent.
    pub fn id(&self) -> &str {
        self.attributes
            .get(ID_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Bus-level delivery handle, e.g. an SQS receipt handle.
    pub fn receipt(&self) -> &str {
        &self.receipt
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub async fn ack(self) {
        if let Err(e) = self.acknowledger.ack(&self.receipt).await {
            log::error!("Failed to ack message {:?} with error {e:?}", self.id());
        }
    }

    pub async fn nack(self) {
        if let Err(e) = self.acknowledger.nack(&self.receipt).await {
            log::error!("Failed to nack message {:?} with error {e:?}", self.id());
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("receipt", &self.receipt)
            .field("attributes", &self.attributes)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A message on its way to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub attributes: HashMap<String, String>,
    pub data: Bytes,
}

impl OutgoingMessage {
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            attributes: HashMap::from([(ID_ATTRIBUTE.to_string(), id.into())]),
            data: data.into(),
        }
    }

    pub fn id(&self) -> &str {
        self.attributes
            .get(ID_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
