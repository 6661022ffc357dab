//! The three-entry-point handler contract and middleware composition

use crate::context::Context;
use crate::error::TxError;
use crate::types::{Request, RequestCheckTx, Response};
use std::sync::Arc;

/// A transaction handler.
///
/// Each entry point either returns a complete response or an error that
/// aborts the invocation. There is no partial response on error.
pub trait TxHandler: Send + Sync {
    /// Mempool admission
    fn check_tx(&self, ctx: Context, req: &Request, check_req: &RequestCheckTx) -> Result<Response, TxError>;

    /// Block execution
    fn deliver_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError>;

    /// Dry run for estimation
    fn simulate_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError>;
}

/// Wraps an inner handler to produce an outer one
pub type Middleware = Box<dyn Fn(Arc<dyn TxHandler>) -> Arc<dyn TxHandler> + Send + Sync>;

/// Wrap `base` in `middlewares`, the first middleware becoming the outermost layer.
///
/// `compose_middlewares(base, [a, b, c])` is `a(b(c(base)))`.
pub fn compose_middlewares(base: Arc<dyn TxHandler>, middlewares: Vec<Middleware>) -> Arc<dyn TxHandler> {
    middlewares
        .into_iter()
        .rev()
        .fold(base, |inner, middleware| middleware(inner))
}

/// Builder for a handler chain, listed outermost first
#[derive(Default)]
pub struct HandlerChainBuilder {
    middlewares: Vec<Middleware>,
}

impl HandlerChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware inside every middleware added before it
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Fold the middlewares over `base`
    pub fn build(self, base: Arc<dyn TxHandler>) -> Arc<dyn TxHandler> {
        compose_middlewares(base, self.middlewares)
    }
}
