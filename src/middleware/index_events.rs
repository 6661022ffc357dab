//! Event indexing middleware

use crate::context::Context;
use crate::error::TxError;
use crate::events::mark_events_to_index;
use crate::handler::{Middleware, TxHandler};
use crate::types::{Request, RequestCheckTx, Response};
use std::collections::HashSet;
use std::sync::Arc;

/// Build a middleware that marks which response events the external indexer should index.
///
/// `index_events` holds "{eventType}.{attributeKey}" entries. If empty, all
/// events are indexed.
pub fn index_events_tx_middleware(index_events: HashSet<String>) -> Middleware {
    let index_events = Arc::new(index_events);
    Box::new(move |inner: Arc<dyn TxHandler>| -> Arc<dyn TxHandler> {
        Arc::new(IndexEventsTxHandler {
            index_events: index_events.clone(),
            inner,
        })
    })
}

pub struct IndexEventsTxHandler {
    index_events: Arc<HashSet<String>>,
    inner: Arc<dyn TxHandler>,
}

impl IndexEventsTxHandler {
    fn mark(&self, mut res: Response) -> Response {
        res.events = mark_events_to_index(std::mem::take(&mut res.events), &self.index_events);
        res
    }
}

impl TxHandler for IndexEventsTxHandler {
    fn check_tx(&self, ctx: Context, req: &Request, check_req: &RequestCheckTx) -> Result<Response, TxError> {
        let res = self.inner.check_tx(ctx, req, check_req)?;
        Ok(self.mark(res))
    }

    fn deliver_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        let res = self.inner.deliver_tx(ctx, req)?;
        Ok(self.mark(res))
    }

    fn simulate_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        let res = self.inner.simulate_tx(ctx, req)?;
        Ok(self.mark(res))
    }
}
