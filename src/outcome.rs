use std::fmt;

/// How a single message was settled. Only `RepeatableError` leads to a nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    MissingId,
    DuplicateId,
    BadMessage,
    RepeatableError,
    NonRepeatableError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "OK",
            Outcome::MissingId => "MissingID",
            Outcome::DuplicateId => "DuplicateID",
            Outcome::BadMessage => "BadMessage",
            Outcome::RepeatableError => "RepeatableError",
            Outcome::NonRepeatableError => "NonRepeatableError",
        }
    }

    pub fn is_retried(&self) -> bool {
        matches!(self, Outcome::RepeatableError)
    }

    /// Maps a sink failure entry to its outcome: `None` is success, `Some(repeatable)`
    /// is a failure.
    pub fn from_failure(failure: Option<bool>) -> Self {
        match failure {
            None => Outcome::Ok,
            Some(true) => Outcome::RepeatableError,
            Some(false) => Outcome::NonRepeatableError,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
