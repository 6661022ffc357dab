//! Pipeline configuration, loaded once at startup

use crate::error::{SerializationError, TxError, ValidationError};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_chain_id() -> String {
    "txpipe-local".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_gas_per_msg() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Events to index, as "{eventType}.{attributeKey}". Empty means index everything.
    #[serde(default)]
    pub index_events: Vec<String>,
    /// Record every store operation into a tracer
    #[serde(default)]
    pub trace_store: bool,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Per-transaction gas limit; `None` is unmetered
    #[serde(default)]
    pub max_tx_gas: Option<u64>,
    #[serde(default = "default_gas_per_msg")]
    pub gas_per_msg: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            index_events: Vec::new(),
            trace_store: false,
            log_level: default_log_level(),
            max_tx_gas: None,
            gas_per_msg: default_gas_per_msg(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, TxError> {
        let config: Self = serde_json::from_str(json).map_err(|e| SerializationError::DecodeFailed {
            reason: format!("pipeline config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TxError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| SerializationError::DecodeFailed {
            reason: format!("reading {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chain_id.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "chain_id cannot be empty".to_string(),
            });
        }

        for entry in &self.index_events {
            match entry.split_once('.') {
                Some((kind, key)) if !kind.is_empty() && !key.is_empty() => {}
                _ => {
                    return Err(ValidationError::InvalidConfig {
                        reason: format!("index event {:?} is not of the form eventType.attributeKey", entry),
                    })
                }
            }
        }

        Ok(())
    }

    /// The allow-set consulted by the event indexing middleware
    pub fn index_event_set(&self) -> HashSet<String> {
        self.index_events.iter().cloned().collect()
    }
}
