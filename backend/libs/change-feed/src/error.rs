//! Error types for change feed operations

use thiserror::Error;

/// Change feed errors
#[derive(Error, Debug)]
pub enum ChangeFeedError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Event serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscriber handler rejected an event
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}
