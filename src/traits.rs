//! Core traits for messages and transactions

use crate::error::{TxError, ValidationError};
use std::any::Any;
use std::fmt;

/// Downcast support for message trait objects
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

// Blanket implementation for every 'static type
impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A self-validating unit of work inside a transaction
pub trait Msg: AsAny + fmt::Debug + Send + Sync {
    /// Routing key for the message, e.g. "/bank.MsgSend"
    fn type_url(&self) -> &str;

    /// Stateless structural checks, independent of any store contents
    fn validate_basic(&self) -> Result<(), TxError>;
}

/// A decoded transaction: an ordered sequence of messages
pub trait Tx: Send + Sync {
    fn msgs(&self) -> Vec<&dyn Msg>;
}

/// Downcast a message to its concrete type
pub fn downcast_msg<M: Msg>(msg: &dyn Msg) -> Option<&M> {
    msg.as_any().downcast_ref::<M>()
}

/// Run basic validation over every message, stopping at the first failure.
///
/// A transaction with no messages is a malformed request. Message errors are
/// returned as the message produced them.
pub fn validate_basic_tx_msgs(msgs: &[&dyn Msg]) -> Result<(), TxError> {
    if msgs.is_empty() {
        return Err(ValidationError::InvalidRequest {
            reason: "must contain at least one message".to_string(),
        }
        .into());
    }

    for msg in msgs {
        msg.validate_basic()?;
    }

    Ok(())
}
