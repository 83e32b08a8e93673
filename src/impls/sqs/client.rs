use super::message::{attribute_values, into_message};
use crate::{
    Acknowledger, Message, MessageClientError, MessagePubClient, MessageSubClient,
    OutgoingMessage,
};
use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::Client;
use std::sync::Arc;

const MAX_NUMBER_OF_MESSAGES: i32 = 10;
const WAIT_TIME_SECONDS: i32 = 20;

/// SQS queue as a message source and destination.
///
/// Received messages are acked by deleting them and nacked by making them visible
/// again right away.
pub struct SqsClient {
    sqs_client: Client,
    queue_url: String,
    max_number_of_messages: i32,
    wait_time_seconds: i32,
    acknowledger: Arc<SqsAcknowledger>,
}

impl SqsClient {
    pub async fn init(queue_url: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), queue_url)
    }

    pub fn new(sqs_client: Client, queue_url: impl Into<String>) -> Self {
        let queue_url = queue_url.into();
        Self {
            acknowledger: Arc::new(SqsAcknowledger {
                sqs_client: sqs_client.clone(),
                queue_url: queue_url.clone(),
            }),
            sqs_client,
            queue_url,
            max_number_of_messages: MAX_NUMBER_OF_MESSAGES,
            wait_time_seconds: WAIT_TIME_SECONDS,
        }
    }

    // SQS caps this at 10
    pub fn with_max_number_of_messages(mut self, max_number_of_messages: i32) -> Self {
        self.max_number_of_messages = max_number_of_messages;
        self
    }

    pub fn with_wait_time_seconds(mut self, wait_time_seconds: i32) -> Self {
        self.wait_time_seconds = wait_time_seconds;
        self
    }
}

#[async_trait]
impl MessageSubClient for SqsClient {
    async fn get_messages(&self) -> Result<Vec<Message>, MessageClientError> {
        let output = self
            .sqs_client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(client_error)?;
        let acknowledger: Arc<dyn Acknowledger> = self.acknowledger.clone();
        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| into_message(message, Arc::clone(&acknowledger)))
            .collect())
    }
}

#[async_trait]
impl MessagePubClient for SqsClient {
    async fn publish_message(&self, message: OutgoingMessage) -> Result<(), MessageClientError> {
        let body = String::from_utf8(message.data.to_vec())
            .map_err(|e| MessageClientError::Unrecoverable(e.to_string()))?;
        self.sqs_client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_attributes(Some(attribute_values(message.attributes)?))
            .send()
            .await
            .map_err(client_error)?;
        Ok(())
    }
}

pub struct SqsAcknowledger {
    sqs_client: Client,
    queue_url: String,
}

#[async_trait]
impl Acknowledger for SqsAcknowledger {
    async fn ack(&self, receipt: &str) -> Result<(), MessageClientError> {
        self.sqs_client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(client_error)?;
        Ok(())
    }

    async fn nack(&self, receipt: &str) -> Result<(), MessageClientError> {
        self.sqs_client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(client_error)?;
        Ok(())
    }
}

fn client_error<E, R>(err: SdkError<E, R>) -> MessageClientError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let reason = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ConstructionFailure(_) => MessageClientError::Unrecoverable(reason),
        _ => MessageClientError::Transient(reason),
    }
}
