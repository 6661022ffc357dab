//! Execution context threaded through the handler chain

use crate::error::ProcessingError;
use crate::events::EventManager;
use crate::logging::{LogEntry, LogLevel, SharedLogger};
use crate::store::{CacheStore, MemStore, StoreHandle, TraceContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which entry point the context was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Mempool admission of a new transaction
    Check,
    /// Mempool re-validation after a commit
    ReCheck,
    /// Block execution; writes reach the committed store
    Deliver,
    /// Dry run; writes are thrown away
    Simulate,
}

impl ExecMode {
    /// True for both mempool modes
    pub fn is_check(&self) -> bool {
        matches!(self, ExecMode::Check | ExecMode::ReCheck)
    }

    /// True only for dry runs
    pub fn is_simulate(&self) -> bool {
        matches!(self, ExecMode::Simulate)
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecMode::Check => "check",
            ExecMode::ReCheck => "recheck",
            ExecMode::Deliver => "deliver",
            ExecMode::Simulate => "simulate",
        };
        f.write_str(name)
    }
}

/// Block metadata the replication engine supplies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier from the pipeline config
    pub chain_id: String,
    /// Height of the block being built
    pub height: u64,
    /// Block time, the only clock the pipeline sees
    pub time: DateTime<Utc>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            height: 0,
            time: DateTime::<Utc>::default(),
        }
    }
}

/// Gas accounting for one invocation. A `None` limit never runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasMeter {
    /// Maximum gas for the invocation, `None` for unmetered
    limit: Option<u64>,
    /// Gas charged so far, saturating
    consumed: u64,
}

impl GasMeter {
    /// Create a meter that fails once more than `limit` is consumed
    pub fn new(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: 0,
        }
    }

    /// Create a meter with no limit
    pub fn infinite() -> Self {
        Self::default()
    }

    /// Get the limit, if any
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Get the gas charged so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Charge `amount`. On overflow of the limit the meter stays saturated at the attempted total.
    pub fn consume_gas(&mut self, amount: u64, descriptor: &str) -> Result<(), ProcessingError> {
        self.consumed = self.consumed.saturating_add(amount);
        match self.limit {
            Some(limit) if self.consumed > limit => Err(ProcessingError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit,
                consumed: self.consumed,
            }),
            _ => Ok(()),
        }
    }
}

/// Execution context for one invocation of the handler chain.
///
/// Cloning is cheap: the store, event manager and logger are shared handles.
/// Header, mode and gas meter are plain values.
#[derive(Debug, Clone)]
pub struct Context {
    /// State store this invocation reads and writes
    store: StoreHandle,
    /// Collector for events emitted in this scope
    event_manager: EventManager,
    /// Block metadata
    header: BlockHeader,
    /// Entry point this context was created for
    mode: ExecMode,
    /// Gas accounting, copied by value with the context
    gas_meter: GasMeter,
    /// Log sink shared with the pipeline
    logger: SharedLogger,
}

impl Context {
    /// Create a context with a fresh event manager, an unmetered gas meter and a default logger
    pub fn new(store: StoreHandle, header: BlockHeader, mode: ExecMode) -> Self {
        Self {
            store,
            event_manager: EventManager::new(),
            header,
            mode,
            gas_meter: GasMeter::infinite(),
            logger: SharedLogger::default(),
        }
    }

    /// Start building a fresh context
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Get the state store
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Get the event manager
    pub fn event_manager(&self) -> &EventManager {
        &self.event_manager
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_simulate(&self) -> bool {
        self.mode.is_simulate()
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    /// Get the gas meter for charging
    pub fn gas_meter_mut(&mut self) -> &mut GasMeter {
        &mut self.gas_meter
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// Replace the state store
    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = store;
        self
    }

    /// Replace the event manager
    pub fn with_event_manager(mut self, event_manager: EventManager) -> Self {
        self.event_manager = event_manager;
        self
    }

    /// Replace the block header
    pub fn with_header(mut self, header: BlockHeader) -> Self {
        self.header = header;
        self
    }

    /// Replace the execution mode
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the gas meter
    pub fn with_gas_meter(mut self, gas_meter: GasMeter) -> Self {
        self.gas_meter = gas_meter;
        self
    }

    /// Replace the logger
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Copy of this context over a fresh branch of its store, with its own event manager.
    ///
    /// The returned `CacheStore` is the branch; write it to merge, drop it to discard.
    pub fn branch(&self, trace_context: Option<TraceContext>) -> (Context, Arc<CacheStore>) {
        let cache = self.store.branch(trace_context);
        let ctx = self
            .clone()
            .with_store(StoreHandle::from(cache.clone()))
            .with_event_manager(EventManager::new());
        (ctx, cache)
    }

    /// Log a message stamped with this context's block time, height and mode
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_entry(level, message, |entry| entry);
    }

    /// Log with extra fields filled in by `decorate`
    pub fn log_entry<F>(&self, level: LogLevel, message: impl Into<String>, decorate: F)
    where
        F: FnOnce(LogEntry) -> LogEntry,
    {
        if !self.logger.enabled(level) {
            return;
        }
        let entry = LogEntry::new(level, self.header.time, message)
            .with_height(self.header.height)
            .with_mode(self.mode.to_string());
        self.logger.log(decorate(entry));
    }
}

/// Builder for fresh per-invocation contexts
pub struct ContextBuilder {
    store: Option<StoreHandle>,
    header: BlockHeader,
    mode: ExecMode,
    gas_meter: GasMeter,
    logger: Option<SharedLogger>,
}

impl ContextBuilder {
    /// Start with an empty header, Deliver mode, no gas limit and no store
    pub fn new() -> Self {
        Self {
            store: None,
            header: BlockHeader::default(),
            mode: ExecMode::Deliver,
            gas_meter: GasMeter::infinite(),
            logger: None,
        }
    }

    /// Use an existing store
    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the block header
    pub fn with_header(mut self, header: BlockHeader) -> Self {
        self.header = header;
        self
    }

    /// Set only the block height
    pub fn with_height(mut self, height: u64) -> Self {
        self.header.height = height;
        self
    }

    /// Set the execution mode
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the gas limit, `None` for unmetered
    pub fn with_gas_limit(mut self, limit: Option<u64>) -> Self {
        self.gas_meter = match limit {
            Some(limit) => GasMeter::new(limit),
            None => GasMeter::infinite(),
        };
        self
    }

    /// Share an existing logger
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the context. Without a store, a fresh empty `MemStore` is used.
    pub fn build(self) -> Context {
        let store = self.store.unwrap_or_else(|| StoreHandle::new(MemStore::new()));
        Context::new(store, self.header, self.mode)
            .with_gas_meter(self.gas_meter)
            .with_logger(self.logger.unwrap_or_default())
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
