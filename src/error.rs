//! Error types for the subscription multiplexer.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for multiplexer operations.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Cannot open subscription {0} without a query")]
    NoQuery(SubscriptionId),

    #[error("Subscription {0} is closed")]
    Closed(SubscriptionId),

    #[error("Subscription id already in use: {0}")]
    DuplicateSubscription(SubscriptionId),

    #[error("Invalid relay message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for MuxError {
    fn from(e: serde_json::Error) -> Self {
        MuxError::Serialization(e.to_string())
    }
}

/// Result type for multiplexer operations.
pub type Result<T> = std::result::Result<T, MuxError>;
