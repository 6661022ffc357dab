//! Deterministic logging for the transaction pipeline
//!
//! Log entries are stamped with the block time and height carried by the
//! execution context rather than the wall clock, so collecting logs never
//! influences what the pipeline computes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Log level for deterministic logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Store-level and per-message detail
    Trace,
    /// Branch lifecycle and accepted transactions
    Debug,
    /// Rejected transactions and commits
    Info,
    /// Discarded branches
    Warn,
    Error,
}

/// A deterministic log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity of the entry
    pub level: LogLevel,
    /// Block time of the context that produced the entry
    pub timestamp: DateTime<Utc>,
    /// Block height of the context that produced the entry
    pub height: u64,
    /// Execution mode name ("check", "deliver", ...)
    pub mode: Option<String>,
    /// Uppercase hex hash of the raw transaction bytes, when known
    pub tx_hash: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Additional structured data
    pub metadata: Vec<(String, String)>,
}

impl LogEntry {
    /// Create an entry with no height, mode, hash or metadata
    pub fn new(level: LogLevel, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp,
            height: 0,
            mode: None,
            tx_hash: None,
            message: message.into(),
            metadata: Vec::new(),
        }
    }

    /// Set the block height
    pub fn with_height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    /// Set the execution mode name
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Attach the transaction hash
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    /// Append a key/value pair; the value is rendered with `to_string`
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.push((key.into(), value.to_string()));
        self
    }

    /// Look up a metadata value by key
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Deterministic logger that collects log entries without side effects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeterministicLogger {
    /// Collected entries in logging order
    entries: Vec<LogEntry>,
    /// Entries below this level are dropped
    min_level: LogLevel,
}

impl DeterministicLogger {
    /// Create a logger that keeps entries at or above `min_level`
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            entries: Vec::new(),
            min_level,
        }
    }

    /// Create a logger that captures all levels
    pub fn all() -> Self {
        Self::new(LogLevel::Trace)
    }

    /// Create a logger that captures Info and above
    pub fn with_info_level() -> Self {
        Self::new(LogLevel::Info)
    }

    /// Log an entry if it meets the minimum level
    pub fn log(&mut self, entry: LogEntry) {
        if self.should_log(entry.level) {
            self.entries.push(entry);
        }
    }

    /// Check whether an entry at `level` would be kept
    pub fn should_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Get the minimum level
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Get all collected entries
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every collected entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries at exactly `level`
    pub fn filter_by_level(&self, level: LogLevel) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.level == level).collect()
    }

    /// Entries tagged with `tx_hash`
    pub fn filter_by_tx_hash(&self, tx_hash: &str) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.tx_hash.as_deref() == Some(tx_hash))
            .collect()
    }
}

impl Default for DeterministicLogger {
    fn default() -> Self {
        Self::with_info_level()
    }
}

/// Clonable handle to one `DeterministicLogger`, carried by every context
#[derive(Debug, Clone, Default)]
pub struct SharedLogger {
    inner: Arc<Mutex<DeterministicLogger>>,
}

impl SharedLogger {
    /// Create a handle to a fresh collector with the given minimum level
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeterministicLogger::new(min_level))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeterministicLogger> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an entry if it meets the minimum level
    pub fn log(&self, entry: LogEntry) {
        self.lock().log(entry);
    }

    /// Check whether entries at `level` are collected, so callers can skip building them
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.lock().should_log(level)
    }

    /// Snapshot of collected entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries().to_vec()
    }

    /// Snapshot of entries at exactly `level`
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.lock().filter_by_level(level).into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every collected entry, for all clones of this handle
    pub fn clear(&self) {
        self.lock().clear();
    }
}
