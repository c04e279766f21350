use std::time::Duration;
use thiserror::Error;

/// Errors raised by the external service bindings
///
/// Every variant is treated as fatal by the driver except when it comes back
/// from a single batch publish, where it is recorded and the run continues.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("cannot decode service response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid service URL: {0}")]
    Url(String),

    #[error("invalid message body: {0}")]
    InvalidBody(String),

    #[error("message does not fit in batch (capacity {capacity} bytes)")]
    BatchFull { capacity: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// True if the service answered with a client or server error status
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reasons the drain measurement stopped before the pipeline drained
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrainError {
    #[error("drain measurement cancelled")]
    Cancelled,

    #[error("queues did not drain within {waited:?}")]
    TimedOut { waited: Duration },
}
