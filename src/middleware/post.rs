//! Post-execution middleware
//!
//! Runs a caller-supplied hook on its own branch of the state store before
//! handing the transaction to the inner handler. The branch is written to the
//! parent only if the hook succeeds; on failure it is dropped and the error is
//! returned unchanged.

use crate::context::Context;
use crate::error::TxError;
use crate::handler::{Middleware, TxHandler};
use crate::hasher::tx_hash;
use crate::logging::LogLevel;
use crate::store::TraceContext;
use crate::traits::{validate_basic_tx_msgs, Tx};
use crate::types::{Request, RequestCheckTx, Response};
use std::sync::Arc;

/// Hook run by the post middleware.
///
/// Receives a context over a fresh branch, the decoded transaction and whether
/// this is a simulation. Returning `Some(ctx)` replaces the ambient fields of
/// the context passed on (gas meter, header, mode); its store and event
/// manager are always reset to the originals.
pub type PostHandlerFn = Arc<dyn Fn(Context, &dyn Tx, bool) -> Result<Option<Context>, TxError> + Send + Sync>;

/// Wrap a closure as a `PostHandlerFn`
pub fn post_handler_fn<F>(f: F) -> PostHandlerFn
where
    F: Fn(Context, &dyn Tx, bool) -> Result<Option<Context>, TxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a middleware that runs `handler` before the wrapped handler.
///
/// With `None`, the middleware only performs basic message validation.
pub fn post_tx_handler_middleware(handler: Option<PostHandlerFn>) -> Middleware {
    Box::new(move |inner: Arc<dyn TxHandler>| -> Arc<dyn TxHandler> {
        Arc::new(PostTxHandler::new(handler.clone(), inner))
    })
}

pub struct PostTxHandler {
    handler: Option<PostHandlerFn>,
    inner: Arc<dyn TxHandler>,
}

impl PostTxHandler {
    pub fn new(handler: Option<PostHandlerFn>, inner: Arc<dyn TxHandler>) -> Self {
        Self { handler, inner }
    }

    fn run_handler(&self, ctx: Context, req: &Request, is_simulate: bool) -> Result<Context, TxError> {
        validate_basic_tx_msgs(&req.tx.msgs())?;

        let handler = match &self.handler {
            Some(handler) => handler,
            None => return Ok(ctx),
        };

        let parent_store = ctx.store().clone();
        let parent_events = ctx.event_manager().clone();
        let hash = tx_hash(&req.tx_bytes).to_string();

        let trace_context = if parent_store.tracing_enabled() {
            let mut trace = TraceContext::new();
            trace.insert("txHash".to_string(), serde_json::Value::String(hash.clone()));
            Some(trace)
        } else {
            None
        };

        let (branch_ctx, cache) = ctx.branch(trace_context);
        ctx.log_entry(LogLevel::Trace, "post handler branch created", |entry| {
            entry
                .with_tx_hash(hash.as_str())
                .with_metadata("traced", parent_store.tracing_enabled())
        });
        let branch_events = branch_ctx.event_manager().clone();

        let new_ctx = match handler(branch_ctx, req.tx.as_ref(), is_simulate) {
            Ok(new_ctx) => new_ctx,
            Err(err) => {
                // The branch is dropped here, nothing reaches the parent
                ctx.log_entry(LogLevel::Warn, "post handler failed, branch discarded", |entry| {
                    entry.with_tx_hash(hash.as_str()).with_metadata("error", &err)
                });
                return Err(err);
            }
        };

        let ctx = match new_ctx {
            Some(new_ctx) => new_ctx
                .with_store(parent_store)
                .with_event_manager(parent_events.clone()),
            None => ctx,
        };

        let written = cache.write()?;
        let events = branch_events.events();
        let emitted = events.len();
        parent_events.emit_events(events);

        ctx.log_entry(LogLevel::Debug, "post handler branch merged", |entry| {
            entry
                .with_tx_hash(hash.as_str())
                .with_metadata("writes", written)
                .with_metadata("events", emitted)
        });

        Ok(ctx)
    }
}

impl TxHandler for PostTxHandler {
    fn check_tx(&self, ctx: Context, req: &Request, check_req: &RequestCheckTx) -> Result<Response, TxError> {
        let ctx = self.run_handler(ctx, req, false)?;
        self.inner.check_tx(ctx, req, check_req)
    }

    fn deliver_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        let ctx = self.run_handler(ctx, req, false)?;
        self.inner.deliver_tx(ctx, req)
    }

    fn simulate_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        let ctx = self.run_handler(ctx, req, true)?;
        self.inner.simulate_tx(ctx, req)
    }
}
