//! Entry points used by the replication engine, with a builder for wiring them up

use crate::config::PipelineConfig;
use crate::context::{BlockHeader, Context, ExecMode};
use crate::error::{TxError, ValidationError};
use crate::handler::TxHandler;
use crate::hasher::{tx_hash, StoreHasher};
use crate::logging::{LogLevel, SharedLogger};
use crate::serialization::TxDecoder;
use crate::store::{CacheStore, MemStore, StoreHandle, Tracer};
use crate::types::{CheckTxKind, Request, RequestCheckTx, Response, StoreHash};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Drives the handler chain for each of the three entry points.
///
/// Every call gets a fresh context. DeliverTx runs against the deliver state,
/// a branch of the root store written at `commit`. CheckTx runs against the
/// check state, a branch reset from the root on every commit. SimulateTx runs
/// against a throwaway branch of the check state.
pub struct TxPipeline {
    config: PipelineConfig,
    decoder: Box<dyn TxDecoder>,
    handler: Arc<dyn TxHandler>,
    root: StoreHandle,
    deliver_state: Arc<CacheStore>,
    check_state: Arc<CacheStore>,
    header: BlockHeader,
    logger: SharedLogger,
    hasher: StoreHasher,
    last_commit: Option<StoreHash>,
}

impl TxPipeline {
    pub fn builder() -> TxPipelineBuilder {
        TxPipelineBuilder::new()
    }

    /// Start a new block
    pub fn begin_block(&mut self, height: u64, time: DateTime<Utc>) {
        self.header = BlockHeader {
            chain_id: self.config.chain_id.clone(),
            height,
            time,
        };
    }

    /// Admit a transaction to the mempool against the check state
    pub fn check_tx(&self, tx_bytes: &[u8], check_req: RequestCheckTx) -> Result<Response, TxError> {
        let req = self.decode(tx_bytes)?;
        let mode = match check_req.kind {
            CheckTxKind::New => ExecMode::Check,
            CheckTxKind::Recheck => ExecMode::ReCheck,
        };
        let ctx = self.new_context(StoreHandle::from(self.check_state.clone()), mode);
        let result = self.handler.check_tx(ctx.clone(), &req, &check_req);
        self.log_result(&ctx, &req, &result);
        result
    }

    /// Execute a transaction in the current block against the deliver state
    pub fn deliver_tx(&self, tx_bytes: &[u8]) -> Result<Response, TxError> {
        let req = self.decode(tx_bytes)?;
        let ctx = self.new_context(StoreHandle::from(self.deliver_state.clone()), ExecMode::Deliver);
        let result = self.handler.deliver_tx(ctx.clone(), &req);
        self.log_result(&ctx, &req, &result);
        result
    }

    /// Dry-run a transaction; nothing it writes survives the call
    pub fn simulate_tx(&self, tx_bytes: &[u8]) -> Result<Response, TxError> {
        let req = self.decode(tx_bytes)?;
        let scratch = StoreHandle::from(self.check_state.clone()).branch(None);
        let ctx = self.new_context(StoreHandle::from(scratch), ExecMode::Simulate);
        let result = self.handler.simulate_tx(ctx.clone(), &req);
        self.log_result(&ctx, &req, &result);
        result
    }

    /// Write the deliver state to the root store and reset both working states
    pub fn commit(&mut self) -> Result<StoreHash, TxError> {
        let written = self.deliver_state.write()?;
        let hash = self.hasher.hash_store(&*self.root)?;

        self.deliver_state = self.root.branch(None);
        self.check_state = self.root.branch(None);
        self.last_commit = Some(hash);

        let ctx = self.new_context(self.root.clone(), ExecMode::Deliver);
        ctx.log_entry(LogLevel::Info, "committed block", |entry| {
            entry
                .with_metadata("writes", written)
                .with_metadata("hash", hash)
        });

        Ok(hash)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// The committed store
    pub fn root_store(&self) -> &StoreHandle {
        &self.root
    }

    pub fn deliver_state(&self) -> &Arc<CacheStore> {
        &self.deliver_state
    }

    pub fn check_state(&self) -> &Arc<CacheStore> {
        &self.check_state
    }

    /// Hash returned by the most recent `commit`
    pub fn last_commit(&self) -> Option<StoreHash> {
        self.last_commit
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// The root store's tracer, when `trace_store` is on
    pub fn tracer(&self) -> Option<Tracer> {
        self.root.tracer()
    }

    fn decode(&self, tx_bytes: &[u8]) -> Result<Request, TxError> {
        let tx = self.decoder.decode(tx_bytes)?;
        if tx.msgs().is_empty() {
            return Err(TxError::invalid_request("must contain at least one message"));
        }
        Ok(Request::new(tx, tx_bytes.to_vec()))
    }

    fn new_context(&self, store: StoreHandle, mode: ExecMode) -> Context {
        Context::builder()
            .with_store(store)
            .with_header(self.header.clone())
            .with_mode(mode)
            .with_gas_limit(self.config.max_tx_gas)
            .with_logger(self.logger.clone())
            .build()
    }

    fn log_result(&self, ctx: &Context, req: &Request, result: &Result<Response, TxError>) {
        let hash = tx_hash(&req.tx_bytes).to_string();
        match result {
            Ok(res) => ctx.log_entry(LogLevel::Debug, "tx accepted", |entry| {
                entry
                    .with_tx_hash(hash.as_str())
                    .with_metadata("gas_used", res.gas_used)
                    .with_metadata("events", res.events.len())
            }),
            Err(err) => ctx.log_entry(LogLevel::Info, "tx rejected", |entry| {
                entry.with_tx_hash(hash.as_str()).with_metadata("error", err)
            }),
        }
    }
}

impl fmt::Debug for TxPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxPipeline")
            .field("chain_id", &self.config.chain_id)
            .field("decoder", &self.decoder.name())
            .field("height", &self.header.height)
            .field("root", &self.root)
            .field("last_commit", &self.last_commit)
            .finish()
    }
}

/// Builder for constructing a pipeline with a fluent API
pub struct TxPipelineBuilder {
    config: PipelineConfig,
    decoder: Option<Box<dyn TxDecoder>>,
    handler: Option<Arc<dyn TxHandler>>,
    store: Option<StoreHandle>,
}

impl TxPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            decoder: None,
            handler: None,
            store: None,
        }
    }

    /// Set the configuration, validated at `build`
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the decoder for raw transaction bytes (required)
    pub fn with_decoder(mut self, decoder: Box<dyn TxDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Set the outermost handler of the chain
    pub fn with_handler(mut self, handler: Arc<dyn TxHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Use an existing root store. Without one, an in-memory store is created,
    /// traced when the config asks for it.
    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<TxPipeline, TxError> {
        self.config.validate()?;

        let decoder = self.decoder.ok_or_else(|| ValidationError::InvalidConfig {
            reason: "Transaction decoder is required".to_string(),
        })?;
        let handler = self.handler.ok_or_else(|| ValidationError::InvalidConfig {
            reason: "Handler chain is required".to_string(),
        })?;

        let root = match self.store {
            Some(store) => store,
            None if self.config.trace_store => StoreHandle::new(MemStore::with_tracer(Tracer::new())),
            None => StoreHandle::new(MemStore::new()),
        };

        let header = BlockHeader {
            chain_id: self.config.chain_id.clone(),
            ..Default::default()
        };

        Ok(TxPipeline {
            logger: SharedLogger::new(self.config.log_level),
            deliver_state: root.branch(None),
            check_state: root.branch(None),
            root,
            config: self.config,
            decoder,
            handler,
            header,
            hasher: StoreHasher::new(),
            last_commit: None,
        })
    }
}

impl Default for TxPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
