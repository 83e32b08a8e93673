use crate::MessageClientError;
use aws_sdk_sns::types::MessageAttributeValue;
use std::collections::HashMap;

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
