//! Transaction Execution Pipeline (txpipe)
//!
//! A middleware chain for processing transactions in a replicated state machine.
//! Independent behaviors are folded over a base handler, and post-execution
//! hooks mutate state on a branch that is written only when they succeed.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod hasher;
pub mod logging;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod serialization;
pub mod store;
pub mod traits;
pub mod types;

// Re-export core types and traits
pub use config::PipelineConfig;
pub use context::{BlockHeader, Context, ContextBuilder, ExecMode, GasMeter};
pub use error::{ProcessingError, SerializationError, StoreError, TxError, ValidationError};
pub use events::{mark_events_to_index, Event, EventAttribute, EventManager};
pub use handler::{compose_middlewares, HandlerChainBuilder, Middleware, TxHandler};
pub use hasher::{tx_hash, StoreHasher};
pub use logging::{DeterministicLogger, LogEntry, LogLevel, SharedLogger};
pub use middleware::{
    index_events_tx_middleware, new_default_chain, post_handler_fn, post_tx_handler_middleware,
    PostHandlerFn,
};
pub use pipeline::{TxPipeline, TxPipelineBuilder};
pub use router::{MsgResult, MsgServiceRouter, RunMsgsTxHandler};
pub use serialization::{encode_bincode, encode_json, BincodeTxDecoder, JsonTxDecoder, TxDecoder};
pub use store::{CacheStore, KVStore, MemStore, StoreHandle, TraceContext, TraceOp, Tracer};
pub use traits::{downcast_msg, validate_basic_tx_msgs, Msg, Tx};
pub use types::{CheckTxKind, Request, RequestCheckTx, Response, StoreHash, TxHash};
