use crate::Message;
use std::collections::HashMap;

/// Open, not yet flushed messages of one worker, keyed by event id.
#[derive(Debug, Default)]
pub struct Batch {
    messages: HashMap<String, Message>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `message` under its id and returns the message it supersedes, if any.
    ///
    /// The caller is responsible for settling the returned message and for rejecting
    /// messages without an id before they get here.
    pub fn insert(&mut self, message: Message) -> Option<Message> {
        self.messages.insert(message.id().to_string(), message)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.contains_key(id)
    }

    /// Hands out the current contents and leaves an empty batch behind.
    pub fn take(&mut self) -> Batch {
        std::mem::take(self)
    }

    pub fn into_messages(self) -> HashMap<String, Message> {
        self.messages
    }
}

impl FromIterator<Message> for Batch {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for message in iter {
            batch.insert(message);
        }
        batch
    }
}
