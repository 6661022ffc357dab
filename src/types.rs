//! Core data types for the transaction pipeline

use crate::events::Event;
use crate::traits::Tx;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Commitment over the full contents of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreHash(pub [u8; 32]);

impl fmt::Display for StoreHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Content hash of raw transaction bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// A decoded transaction together with the raw bytes it was decoded from
#[derive(Clone)]
pub struct Request {
    pub tx: Arc<dyn Tx>,
    pub tx_bytes: Vec<u8>,
}

impl Request {
    pub fn new(tx: Arc<dyn Tx>, tx_bytes: Vec<u8>) -> Self {
        Self { tx, tx_bytes }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("msgs", &self.tx.msgs().len())
            .field("tx_bytes", &self.tx_bytes.len())
            .finish()
    }
}

/// Whether a CheckTx call admits a new transaction or re-checks one already in the mempool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckTxKind {
    #[default]
    New,
    Recheck,
}

/// CheckTx-specific request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCheckTx {
    pub kind: CheckTxKind,
}

/// Result of a successful pass through the handler chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub data: Vec<u8>,
    pub log: String,
    pub events: Vec<Event>,
    pub msg_responses: Vec<Vec<u8>>,
}
