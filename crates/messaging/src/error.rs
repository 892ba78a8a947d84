use std::time::Duration;

use thiserror::Error;

use crate::ExchangeKind;

/// Errors that can occur when publishing events.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event body could not be encoded. The only error
    /// [`crate::EventPublisher::publish`] returns.
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker did not acknowledge in time.
    #[error("Broker did not acknowledge within {0:?}")]
    Timeout(Duration),

    /// The broker connection failed or rejected the message.
    #[error("Broker transport error: {0}")]
    Transport(String),

    /// An exchange was redeclared or published to with a different type.
    #[error("Exchange {exchange} is declared as {declared}, not {requested}")]
    ExchangeKindMismatch {
        exchange: String,
        declared: ExchangeKind,
        requested: ExchangeKind,
    },

    #[error("Exchange not found: {0}")]
    UnknownExchange(String),

    #[error("Queue not found: {0}")]
    UnknownQueue(String),
}

/// Result type for publishing operations.
pub type Result<T> = std::result::Result<T, PublishError>;
