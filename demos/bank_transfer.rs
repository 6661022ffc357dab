//! Bank Transfer Example
//!
//! This example wires a small bank application into the transaction pipeline:
//! - Balances stored under `balance/{account}` in the root store
//! - A post hook that charges a flat fee on its own store branch
//! - A message router executing transfers
//! - Event indexing restricted to transfer recipients
//! - CheckTx, DeliverTx and SimulateTx over one block, then commit

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use txpipe::{
    downcast_msg, encode_json, new_default_chain, post_handler_fn, Context, Event, JsonTxDecoder, KVStore,
    LogLevel, MemStore, Msg, MsgResult, MsgServiceRouter, PipelineConfig, PostHandlerFn, ProcessingError,
    RequestCheckTx, RunMsgsTxHandler, StoreHandle, Tx, TxError, TxPipeline, ValidationError,
};

const FEE: u64 = 50;

// ============================================================================
// Application Model
// ============================================================================

/// Move funds between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgTransfer {
    pub from: String,
    pub to: String,
    pub amount: u64,
}

impl Msg for MsgTransfer {
    fn type_url(&self) -> &str {
        "/bank.MsgTransfer"
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        if self.amount == 0 {
            return Err(ValidationError::InvalidMessage {
                msg_type: self.type_url().to_string(),
                reason: "amount must be positive".to_string(),
            }
            .into());
        }
        if self.from == self.to {
            return Err(ValidationError::InvalidMessage {
                msg_type: self.type_url().to_string(),
                reason: "cannot transfer to the same account".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTx {
    pub msgs: Vec<MsgTransfer>,
    pub memo: String,
}

impl Tx for BankTx {
    fn msgs(&self) -> Vec<&dyn Msg> {
        self.msgs.iter().map(|m| m as &dyn Msg).collect()
    }
}

fn balance_key(account: &str) -> Vec<u8> {
    format!("balance/{}", account).into_bytes()
}

fn get_balance(store: &dyn KVStore, account: &str) -> Result<u64, TxError> {
    let raw = store.get(&balance_key(account))?;
    Ok(raw
        .and_then(|v| String::from_utf8(v).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0))
}

fn set_balance(store: &dyn KVStore, account: &str, amount: u64) -> Result<(), TxError> {
    store.set(&balance_key(account), amount.to_string().as_bytes())?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Charge the first sender a flat fee, credited to the fee collector
fn fee_hook() -> PostHandlerFn {
    post_handler_fn(|ctx: Context, tx: &dyn Tx, is_simulate: bool| {
        let payer = tx
            .msgs()
            .first()
            .and_then(|m| downcast_msg::<MsgTransfer>(*m))
            .map(|m| m.from.clone())
            .ok_or_else(|| ProcessingError::PostHandlerFailed {
                reason: "transaction has no fee payer".to_string(),
            })?;

        let funds = get_balance(&**ctx.store(), &payer)?;
        if funds < FEE {
            return Err(ProcessingError::PostHandlerFailed {
                reason: format!("{} cannot pay fee: have {}, need {}", payer, funds, FEE),
            }
            .into());
        }

        let collected = get_balance(&**ctx.store(), "fee_collector")?;
        set_balance(&**ctx.store(), &payer, funds - FEE)?;
        set_balance(&**ctx.store(), "fee_collector", collected + FEE)?;

        ctx.event_manager().emit(
            Event::new("fee")
                .with_attribute("payer", payer)
                .with_attribute("amount", FEE.to_string())
                .with_attribute("simulated", is_simulate.to_string()),
        );
        Ok(None)
    })
}

fn bank_router() -> Result<MsgServiceRouter, TxError> {
    let mut router = MsgServiceRouter::new();
    router.register("/bank.MsgTransfer", |ctx: &mut Context, msg: &MsgTransfer| {
        let from = get_balance(&**ctx.store(), &msg.from)?;
        if from < msg.amount {
            return Err(ProcessingError::MessageFailed {
                type_url: msg.type_url().to_string(),
                reason: format!("insufficient balance: have {}, need {}", from, msg.amount),
            }
            .into());
        }
        let to = get_balance(&**ctx.store(), &msg.to)?;
        set_balance(&**ctx.store(), &msg.from, from - msg.amount)?;
        set_balance(&**ctx.store(), &msg.to, to + msg.amount)?;

        ctx.event_manager().emit(
            Event::new("transfer")
                .with_attribute("sender", msg.from.clone())
                .with_attribute("recipient", msg.to.clone())
                .with_attribute("amount", msg.amount.to_string()),
        );
        Ok(MsgResult {
            data: Vec::new(),
            log: format!("{} -> {}: {}", msg.from, msg.to, msg.amount),
        })
    })?;
    Ok(router)
}

fn transfer(from: &str, to: &str, amount: u64) -> Result<Vec<u8>, TxError> {
    let tx = BankTx {
        msgs: vec![MsgTransfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }],
        memo: String::new(),
    };
    Ok(encode_json(&tx)?)
}

fn print_balances(label: &str, store: &dyn KVStore) -> Result<(), TxError> {
    println!("{}:", label);
    for account in ["ACC001", "ACC002", "ACC003", "fee_collector"] {
        println!("  {:<14} {:>8}", account, get_balance(store, account)?);
    }
    Ok(())
}

// ============================================================================
// Example Usage
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Bank Transfer Example ===\n");

    let config = PipelineConfig::from_json_str(
        r#"{
            "chain_id": "bank-demo",
            "index_events": ["transfer.recipient"],
            "log_level": "debug",
            "max_tx_gas": 10000,
            "gas_per_msg": 1200
        }"#,
    )?;

    let genesis = StoreHandle::new(MemStore::new());
    set_balance(&*genesis, "ACC001", 100_000)?;
    set_balance(&*genesis, "ACC002", 500)?;
    set_balance(&*genesis, "ACC003", 20)?;

    let base = Arc::new(RunMsgsTxHandler::new(bank_router()?, config.gas_per_msg));
    let chain = new_default_chain(&config, base, Some(fee_hook()));

    let mut pipeline = TxPipeline::builder()
        .with_config(config)
        .with_decoder(Box::new(JsonTxDecoder::<BankTx>::new()))
        .with_handler(chain)
        .with_store(genesis)
        .build()?;

    pipeline.begin_block(1, Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default());
    print_balances("Genesis", &**pipeline.root_store())?;
    println!();

    // Mempool admission
    println!("=== CheckTx ===");
    let txs = vec![
        transfer("ACC001", "ACC002", 10_000)?,
        transfer("ACC002", "ACC003", 300)?,
        transfer("ACC003", "ACC001", 5)?,
    ];
    for (i, tx) in txs.iter().enumerate() {
        match pipeline.check_tx(tx, RequestCheckTx::default()) {
            Ok(res) => println!("  tx{} admitted ({} events)", i, res.events.len()),
            Err(err) => println!("  tx{} refused: {}", i, err),
        }
    }
    println!();

    // Gas estimate
    println!("=== SimulateTx ===");
    let res = pipeline.simulate_tx(&txs[0])?;
    println!("  gas used {} of {}\n", res.gas_used, res.gas_wanted);

    // Block execution
    println!("=== DeliverTx ===");
    for (i, tx) in txs.iter().enumerate() {
        match pipeline.deliver_tx(tx) {
            Ok(res) => {
                println!("  tx{} ok: {}", i, res.log);
                for event in &res.events {
                    let indexed: Vec<&str> = event
                        .attributes
                        .iter()
                        .filter(|a| a.index)
                        .map(|a| a.key.as_str())
                        .collect();
                    println!("    {:<10} indexed {:?}", event.kind, indexed);
                }
            }
            Err(err) => println!("  tx{} failed: {}", i, err),
        }
    }
    println!();

    let hash = pipeline.commit()?;
    print_balances("After block 1", &**pipeline.root_store())?;
    println!("  Commit hash: {}\n", hash);

    println!("=== Log ===");
    for entry in pipeline.logger().entries() {
        if entry.level >= LogLevel::Info || entry.message == "post handler branch merged" {
            println!(
                "  [{:?}] h={} {} {}",
                entry.level,
                entry.height,
                entry.mode.as_deref().unwrap_or("-"),
                entry.message
            );
        }
    }

    Ok(())
}
