//! Message routing and the base handler that executes messages

use crate::context::Context;
use crate::error::{ProcessingError, TxError, ValidationError};
use crate::events::Event;
use crate::handler::TxHandler;
use crate::logging::LogLevel;
use crate::traits::{downcast_msg, Msg};
use crate::types::{Request, RequestCheckTx, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// Output of one message handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgResult {
    pub data: Vec<u8>,
    pub log: String,
}

/// Type-erased message handler stored in the router
pub type MsgHandlerFn = Box<dyn Fn(&mut Context, &dyn Msg) -> Result<MsgResult, TxError> + Send + Sync>;

/// Maps message type URLs to their handlers
#[derive(Default)]
pub struct MsgServiceRouter {
    routes: HashMap<String, MsgHandlerFn>,
}

impl MsgServiceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `type_url`. Each type URL may be registered once.
    pub fn register<M, F>(&mut self, type_url: impl Into<String>, handler: F) -> Result<(), TxError>
    where
        M: Msg,
        F: Fn(&mut Context, &M) -> Result<MsgResult, TxError> + Send + Sync + 'static,
    {
        let type_url = type_url.into();
        if self.routes.contains_key(&type_url) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("message route {} registered twice", type_url),
            }
            .into());
        }

        let route_url = type_url.clone();
        let erased: MsgHandlerFn = Box::new(
            move |ctx: &mut Context, msg: &dyn Msg| -> Result<MsgResult, TxError> {
                let msg = downcast_msg::<M>(msg).ok_or_else(|| ProcessingError::MessageFailed {
                    type_url: route_url.clone(),
                    reason: "message type does not match its route".to_string(),
                })?;
                handler(ctx, msg)
            },
        );
        self.routes.insert(type_url, erased);
        Ok(())
    }

    pub fn has_route(&self, type_url: &str) -> bool {
        self.routes.contains_key(type_url)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `msg` to its handler
    pub fn route(&self, ctx: &mut Context, msg: &dyn Msg) -> Result<MsgResult, TxError> {
        let handler = self
            .routes
            .get(msg.type_url())
            .ok_or_else(|| ProcessingError::UnknownMessage {
                type_url: msg.type_url().to_string(),
            })?;
        handler(ctx, msg)
    }
}

/// Base handler: executes every message through the router.
///
/// CheckTx runs no messages. DeliverTx and SimulateTx run all messages on one
/// branch, charging `gas_per_msg` each and emitting a `message` event per
/// message. The branch is written only if every message succeeds.
pub struct RunMsgsTxHandler {
    router: Arc<MsgServiceRouter>,
    gas_per_msg: u64,
}

impl RunMsgsTxHandler {
    pub fn new(router: MsgServiceRouter, gas_per_msg: u64) -> Self {
        Self {
            router: Arc::new(router),
            gas_per_msg,
        }
    }

    pub fn router(&self) -> &MsgServiceRouter {
        &self.router
    }

    fn run_msgs(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        let (mut msg_ctx, cache) = ctx.branch(None);
        let msgs = req.tx.msgs();
        let mut msg_responses = Vec::with_capacity(msgs.len());
        let mut logs = Vec::with_capacity(msgs.len());

        for (index, msg) in msgs.into_iter().enumerate() {
            msg_ctx.gas_meter_mut().consume_gas(self.gas_per_msg, msg.type_url())?;
            let result = self.router.route(&mut msg_ctx, msg)?;

            msg_ctx.event_manager().emit(
                Event::new("message")
                    .with_attribute("action", msg.type_url())
                    .with_attribute("msg_index", index.to_string()),
            );
            msg_responses.push(result.data);
            if !result.log.is_empty() {
                logs.push(result.log);
            }
        }

        let written = cache.write()?;
        ctx.event_manager().emit_events(msg_ctx.event_manager().events());

        ctx.log_entry(LogLevel::Trace, "messages executed", |entry| {
            entry
                .with_metadata("msgs", msg_responses.len())
                .with_metadata("writes", written)
        });

        Ok(Response {
            gas_wanted: ctx.gas_meter().limit().unwrap_or(0),
            gas_used: msg_ctx.gas_meter().consumed(),
            data: Vec::new(),
            log: logs.join("; "),
            events: ctx.event_manager().events(),
            msg_responses,
        })
    }
}

impl TxHandler for RunMsgsTxHandler {
    fn check_tx(&self, ctx: Context, _req: &Request, _check_req: &RequestCheckTx) -> Result<Response, TxError> {
        Ok(Response {
            gas_wanted: ctx.gas_meter().limit().unwrap_or(0),
            gas_used: ctx.gas_meter().consumed(),
            events: ctx.event_manager().events(),
            ..Default::default()
        })
    }

    fn deliver_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        self.run_msgs(ctx, req)
    }

    fn simulate_tx(&self, ctx: Context, req: &Request) -> Result<Response, TxError> {
        self.run_msgs(ctx, req)
    }
}
