use super::message::attribute_values;
use crate::{MessageClientError, MessagePubClient, OutgoingMessage};
use async_trait::async_trait;
use aws_sdk_sns::error::{DisplayErrorContext, SdkError};
use aws_sdk_sns::Client;

/// Publishes to an SNS topic. Message attributes travel as SNS string attributes, so
/// SQS subscriptions with raw delivery see them unchanged.
pub struct SnsClient {
    sns_client: Client,
    topic_arn: String,
}

impl SnsClient {
    pub async fn init(topic_arn: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), topic_arn)
    }

    pub fn new(sns_client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            sns_client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl MessagePubClient for SnsClient {
    async fn publish_message(&self, message: OutgoingMessage) -> Result<(), MessageClientError> {
        let body = String::from_utf8(message.data.to_vec())
            .map_err(|e| MessageClientError::Unrecoverable(e.to_string()))?;
        self.sns_client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .set_message_attributes(Some(attribute_values(message.attributes)?))
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
