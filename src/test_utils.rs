use crate::{
    Acknowledger, BatchSink, DecodeError, Decoder, EventEnvelope, EvaluationEvent,
    FailureMap, Message, MessageClientError, MessagePubClient, MessageSubClient,
    OutgoingMessage, ReasonType, SinkError, EVALUATION_EVENT, ID_ATTRIBUTE,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MockAcknowledger {
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<String>>,
}

impl MockAcknowledger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    pub(crate) fn nacked(&self) -> Vec<String> {
        self.nacked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Acknowledger for MockAcknowledger {
    async fn ack(&self, receipt: &str) -> Result<(), MessageClientError> {
        self.acked.lock().unwrap().push(receipt.to_string());
        Ok(())
    }

    async fn nack(&self, receipt: &str) -> Result<(), MessageClientError> {
        self.nacked.lock().unwrap().push(receipt.to_string());
        Ok(())
    }
}

/// A delivery whose receipt is its id.
pub(crate) fn message(acker: &Arc<MockAcknowledger>, id: &str, data: &[u8]) -> Message {
    message_with_receipt(acker, id, id, data)
}

pub(crate) fn message_with_receipt(
    acker: &Arc<MockAcknowledger>,
    id: &str,
    receipt: &str,
    data: &[u8],
) -> Message {
    Message::new(
        receipt,
        HashMap::from([(ID_ATTRIBUTE.to_string(), id.to_string())]),
        data.to_vec(),
        acker.clone(),
    )
}

pub(crate) fn message_without_id(acker: &Arc<MockAcknowledger>, receipt: &str) -> Message {
    Message::new(receipt, HashMap::new(), Vec::new(), acker.clone())
}

/// Hands out the queued chunks in order, then never returns.
#[derive(Default)]
pub(crate) struct MockMessageSubClient {
    chunks: Mutex<VecDeque<Result<Vec<Message>, MessageClientError>>>,
}

impl MockMessageSubClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_chunk(&self, messages: Vec<Message>) {
        self.chunks.lock().unwrap().push_back(Ok(messages));
    }

    pub(crate) fn push_error(&self, err: MessageClientError) {
        self.chunks.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl MessageSubClient for MockMessageSubClient {
    async fn get_messages(&self) -> Result<Vec<Message>, MessageClientError> {
        let next = self.chunks.lock().unwrap().pop_front();
        match next {
            Some(chunk) => chunk,
            None => std::future::pending().await,
        }
    }
}

/// Payloads are decoded as UTF-8 text.
pub(crate) struct Utf8Decoder;

impl Decoder<String> for Utf8Decoder {
    fn decode(&self, data: &[u8]) -> Result<String, DecodeError> {
        String::from_utf8(data.to_vec()).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))
    }
}

/// Records writes of text events, partitioned by the text before the first `:`.
#[derive(Default)]
pub(crate) struct MockSink {
    writes: Mutex<Vec<(String, HashMap<String, String>)>>,
    failures: Mutex<FailureMap>,
    partition_errors: Mutex<HashMap<String, SinkError>>,
    delay: Mutex<Option<Duration>>,
}

impl MockSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(&self, id: &str, repeatable: bool) {
        self.failures
            .lock()
            .unwrap()
            .insert(id.to_string(), repeatable);
    }

    pub(crate) fn fail_partition(&self, partition: &str, err: SinkError) {
        self.partition_errors
            .lock()
            .unwrap()
            .insert(partition.to_string(), err);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Partition and sorted ids of every write call, in call order.
    pub(crate) fn writes(&self) -> Vec<(String, Vec<String>)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(partition, events)| {
                let mut ids: Vec<String> = events.keys().cloned().collect();
                ids.sort();
                (partition.clone(), ids)
            })
            .collect()
    }

    pub(crate) fn written_ids(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .flat_map(|(_, ids)| ids)
            .collect()
    }

    pub(crate) fn written_payloads(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, events)| {
                let mut payloads: Vec<String> = events.values().cloned().collect();
                payloads.sort();
                payloads
            })
            .collect()
    }
}

#[async_trait]
impl BatchSink for MockSink {
    type Event = String;

    fn partition_key(&self, event: &String) -> String {
        event.split(':').next().unwrap_or_default().to_string()
    }

    async fn write(
        &self,
        partition: &str,
        events: HashMap<String, String>,
    ) -> Result<FailureMap, SinkError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failures: FailureMap = {
            let configured = self.failures.lock().unwrap();
            events
                .keys()
                .filter_map(|id| configured.get(id).map(|r| (id.clone(), *r)))
                .collect()
        };
        self.writes
            .lock()
            .unwrap()
            .push((partition.to_string(), events));

        if let Some(err) = self.partition_errors.lock().unwrap().get(partition) {
            return Err(err.clone());
        }
        Ok(failures)
    }
}

#[derive(Default)]
pub(crate) struct MockMessagePubClient {
    published: Mutex<Vec<OutgoingMessage>>,
    err: Option<MessageClientError>,
}

impl MockMessagePubClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(err: MessageClientError) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            err: Some(err),
        }
    }

    pub(crate) fn published(&self) -> Vec<OutgoingMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagePubClient for MockMessagePubClient {
    async fn publish_message(&self, message: OutgoingMessage) -> Result<(), MessageClientError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        self.published.lock().unwrap().push(message);
        Ok(())
    }
}

/// Serialized evaluation envelope with a fixed id.
pub(crate) fn evaluation_payload(
    id: &str,
    environment_id: &str,
    feature_id: &str,
    variation_id: &str,
    reason: ReasonType,
) -> Vec<u8> {
    let data = EvaluationEvent {
        feature_id: feature_id.to_string(),
        feature_version: 1,
        user_id: "user-1".to_string(),
        variation_id: variation_id.to_string(),
        reason,
        tag: "web".to_string(),
    };
    let mut envelope = EventEnvelope::create(EVALUATION_EVENT, environment_id, Utc::now(), &data)
        .unwrap();
    envelope.id = id.to_string();
    envelope.to_vec().unwrap()
}
