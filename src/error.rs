//! Error types for the transaction pipeline

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

impl TxError {
    /// Shorthand for the malformed-request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        TxError::Validation(ValidationError::InvalidRequest { reason: reason.into() })
    }

    /// Returns true if this is a malformed-request error
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, TxError::Validation(ValidationError::InvalidRequest { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid message {msg_type}: {reason}")]
    InvalidMessage { msg_type: String, reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("post handler failed: {reason}")]
    PostHandlerFailed { reason: String },

    #[error("unrecognized message type: {type_url}")]
    UnknownMessage { type_url: String },

    #[error("message {type_url} failed: {reason}")]
    MessageFailed { type_url: String, reason: String },

    #[error("out of gas in location: {descriptor}; gas limit: {limit}, consumed: {consumed}")]
    OutOfGas { descriptor: String, limit: u64, consumed: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned: {store}")]
    LockPoisoned { store: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    #[error("decode failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("encode failed: {reason}")]
    EncodeFailed { reason: String },
}
