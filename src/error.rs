use crate::{MessageClientError, SinkError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("message source error: {0}")]
    Source(#[from] MessageClientError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("worker '{worker}' panicked: {message}")]
    Panicked { worker: String, message: String },

    #[error("worker '{worker}' was cancelled before finishing")]
    Cancelled { worker: String },

    #[error("persister is already running or has already run")]
    AlreadyStarted,
}
