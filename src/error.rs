//! Error types for the status stream.

use thiserror::Error;

/// Main error type for stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Subscription limit reached ({limit} active)")]
    ResourceExhausted { limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Session closed")]
    Closed,

    #[error("Timed out waiting for event")]
    Timeout,

    #[error("No event pending")]
    Empty,
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StreamError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StreamError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StreamError::Deserialization(e.to_string())
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
