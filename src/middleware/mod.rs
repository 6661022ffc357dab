//! Middlewares shipped with the pipeline

pub mod index_events;
pub mod post;

pub use index_events::{index_events_tx_middleware, IndexEventsTxHandler};
pub use post::{post_handler_fn, post_tx_handler_middleware, PostHandlerFn, PostTxHandler};

use crate::config::PipelineConfig;
use crate::handler::{HandlerChainBuilder, TxHandler};
use std::sync::Arc;

/// The standard chain: event indexing outermost, then the post hook, then `base`.
pub fn new_default_chain(
    config: &PipelineConfig,
    base: Arc<dyn TxHandler>,
    post_handler: Option<PostHandlerFn>,
) -> Arc<dyn TxHandler> {
    HandlerChainBuilder::new()
        .with_middleware(index_events_tx_middleware(config.index_event_set()))
        .with_middleware(post_tx_handler_middleware(post_handler))
        .build(base)
}
