use crate::{Acknowledger, Message, MessageClientError};
use aws_sdk_sqs::types::{Message as SqsMessage, MessageAttributeValue};
use std::collections::HashMap;
use std::sync::Arc;

// only string attributes are carried over, which is all the publishers set
pub(super) fn into_message(value: SqsMessage, acknowledger: Arc<dyn Acknowledger>) -> Message {
    let attributes = value
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, attr)| attr.string_value.map(|v| (name, v)))
        .collect();
    Message::new(
        value.receipt_handle.unwrap_or_default(),
        attributes,
        value.body.unwrap_or_default(),
        acknowledger,
    )
}

pub(super) fn attribute_values(
    attributes: HashMap<String, String>,
) -> Result<HashMap<String, MessageAttributeValue>, MessageClientError> {
    attributes
        .into_iter()
        .map(|(name, value)| {
            let attr = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| MessageClientError::Unrecoverable(e.to_string()))?;
            Ok((name, attr))
        })
        .collect()
}
