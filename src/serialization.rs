//! Pluggable transaction decoding

use crate::error::SerializationError;
use crate::traits::Tx;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns raw transaction bytes into a transaction object
pub trait TxDecoder: Send + Sync {
    fn decode(&self, tx_bytes: &[u8]) -> Result<Arc<dyn Tx>, SerializationError>;

    /// Get the name of this decoding method
    fn name(&self) -> &str;
}

/// Bincode decoding backend for a concrete transaction type
#[derive(Debug)]
pub struct BincodeTxDecoder<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> BincodeTxDecoder<T> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<T> Default for BincodeTxDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TxDecoder for BincodeTxDecoder<T>
where
    T: Tx + DeserializeOwned + 'static,
{
    fn decode(&self, tx_bytes: &[u8]) -> Result<Arc<dyn Tx>, SerializationError> {
        let tx: T = bincode::deserialize(tx_bytes).map_err(|e| SerializationError::DecodeFailed {
            reason: format!("Bincode deserialization failed: {}", e),
        })?;
        Ok(Arc::new(tx))
    }

    fn name(&self) -> &str {
        "bincode"
    }
}

/// JSON decoding backend for a concrete transaction type
#[derive(Debug)]
pub struct JsonTxDecoder<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonTxDecoder<T> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<T> Default for JsonTxDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TxDecoder for JsonTxDecoder<T>
where
    T: Tx + DeserializeOwned + 'static,
{
    fn decode(&self, tx_bytes: &[u8]) -> Result<Arc<dyn Tx>, SerializationError> {
        let tx: T = serde_json::from_slice(tx_bytes).map_err(|e| SerializationError::DecodeFailed {
            reason: format!("JSON deserialization failed: {}", e),
        })?;
        Ok(Arc::new(tx))
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Encode a transaction with bincode, the inverse of `BincodeTxDecoder`
pub fn encode_bincode<T: Serialize>(tx: &T) -> Result<Vec<u8>, SerializationError> {
    bincode::serialize(tx).map_err(|e| SerializationError::EncodeFailed {
        reason: format!("Bincode serialization failed: {}", e),
    })
}

/// Encode a transaction as JSON, the inverse of `JsonTxDecoder`
pub fn encode_json<T: Serialize>(tx: &T) -> Result<Vec<u8>, SerializationError> {
    serde_json::to_vec(tx).map_err(|e| SerializationError::EncodeFailed {
        reason: format!("JSON serialization failed: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TxError;
    use crate::traits::Msg;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Msg for Note {
        fn type_url(&self) -> &str {
            "/test.Note"
        }

        fn validate_basic(&self) -> Result<(), TxError> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NoteTx {
        notes: Vec<Note>,
    }

    impl Tx for NoteTx {
        fn msgs(&self) -> Vec<&dyn Msg> {
            self.notes.iter().map(|n| n as &dyn Msg).collect()
        }
    }

    fn sample() -> NoteTx {
        NoteTx {
            notes: vec![Note { text: "a".into() }, Note { text: "b".into() }],
        }
    }

    #[test]
    fn test_json_decoder() {
        let bytes = encode_json(&sample()).unwrap();
        let tx = JsonTxDecoder::<NoteTx>::new().decode(&bytes).unwrap();
        assert_eq!(tx.msgs().len(), 2);
    }

    #[test]
    fn test_bincode_decoder() {
        let bytes = encode_bincode(&sample()).unwrap();
        let decoder = BincodeTxDecoder::<NoteTx>::new();
        assert_eq!(decoder.name(), "bincode");
        assert_eq!(decoder.decode(&bytes).unwrap().msgs().len(), 2);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = JsonTxDecoder::<NoteTx>::new().decode(b"\xff\x00").err().unwrap();
        assert!(matches!(err, SerializationError::DecodeFailed { .. }));
    }
}
