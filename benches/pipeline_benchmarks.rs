//! Benchmarks for the handler chain
//!
//! These benchmarks measure:
//! - Overhead of the post middleware branch/merge cycle
//! - Event index marking for various allow-set sizes
//! - Store hashing after a block of deliveries

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use txpipe::*;

// ============================================================================
// Test Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValue {
    pub key: String,
    pub value: String,
}

impl Msg for SetValue {
    fn type_url(&self) -> &str {
        "/bench.SetValue"
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchTx {
    pub msgs: Vec<SetValue>,
}

impl Tx for BenchTx {
    fn msgs(&self) -> Vec<&dyn Msg> {
        self.msgs.iter().map(|m| m as &dyn Msg).collect()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn router() -> MsgServiceRouter {
    let mut router = MsgServiceRouter::new();
    router
        .register("/bench.SetValue", |ctx: &mut Context, msg: &SetValue| {
            ctx.store().set(msg.key.as_bytes(), msg.value.as_bytes())?;
            ctx.event_manager().emit(Event::new("set").with_attribute("key", msg.key.clone()));
            Ok(MsgResult::default())
        })
        .unwrap();
    router
}

fn counter_hook() -> PostHandlerFn {
    post_handler_fn(|ctx: Context, _tx: &dyn Tx, _is_simulate: bool| {
        let count = ctx
            .store()
            .get(b"counter")?
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        ctx.store().set(b"counter", (count + 1).to_string().as_bytes())?;
        Ok(None)
    })
}

fn create_pipeline() -> TxPipeline {
    let config = PipelineConfig::default();
    let base = Arc::new(RunMsgsTxHandler::new(router(), config.gas_per_msg));
    TxPipeline::builder()
        .with_handler(new_default_chain(&config, base, Some(counter_hook())))
        .with_config(config)
        .with_decoder(Box::new(BincodeTxDecoder::<BenchTx>::new()))
        .build()
        .unwrap()
}

fn create_tx(index: usize, msgs: usize) -> Vec<u8> {
    let tx = BenchTx {
        msgs: (0..msgs)
            .map(|m| SetValue {
                key: format!("key{:06}_{}", index, m),
                value: format!("value{}", index),
            })
            .collect(),
    };
    encode_bincode(&tx).unwrap()
}

fn create_events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            Event::new(format!("event{}", i % 10))
                .with_attribute("sender", format!("addr{}", i))
                .with_attribute("amount", i.to_string())
        })
        .collect()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_deliver_tx(c: &mut Criterion) {
    let mut group = c.benchmark_group("deliver_tx");

    for msgs in [1, 5, 20].iter() {
        group.throughput(Throughput::Elements(*msgs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(msgs), msgs, |b, &msgs| {
            let pipeline = create_pipeline();
            let tx = create_tx(0, msgs);
            b.iter(|| black_box(pipeline.deliver_tx(black_box(&tx)).unwrap()));
        });
    }

    group.finish();
}

fn bench_post_hook_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_hook_overhead");
    let tx: Arc<dyn Tx> = Arc::new(BenchTx {
        msgs: vec![SetValue {
            key: "k".to_string(),
            value: "v".to_string(),
        }],
    });
    let req = Request::new(tx, b"bench".to_vec());
    let base: Arc<dyn TxHandler> = Arc::new(RunMsgsTxHandler::new(router(), 0));

    let without = HandlerChainBuilder::new()
        .with_middleware(post_tx_handler_middleware(None))
        .build(base.clone());
    let with = HandlerChainBuilder::new()
        .with_middleware(post_tx_handler_middleware(Some(counter_hook())))
        .build(base);

    group.bench_function("no_hook", |b| {
        b.iter(|| black_box(without.deliver_tx(Context::builder().build(), &req).unwrap()));
    });
    group.bench_function("counter_hook", |b| {
        b.iter(|| black_box(with.deliver_tx(Context::builder().build(), &req).unwrap()));
    });

    group.finish();
}

fn bench_mark_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("mark_events_to_index");
    let events = create_events(100);

    for set_size in [0, 1, 10].iter() {
        let set: HashSet<String> = (0..*set_size).map(|i| format!("event{}.sender", i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(set_size), &set, |b, set| {
            b.iter(|| black_box(mark_events_to_index(events.clone(), set)));
        });
    }

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(20);

    for txs in [10, 100].iter() {
        group.throughput(Throughput::Elements(*txs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(txs), txs, |b, &txs| {
            let batch: Vec<Vec<u8>> = (0..txs).map(|i| create_tx(i, 1)).collect();
            b.iter(|| {
                let mut pipeline = create_pipeline();
                for tx in &batch {
                    pipeline.deliver_tx(tx).unwrap();
                }
                black_box(pipeline.commit().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_deliver_tx,
    bench_post_hook_overhead,
    bench_mark_events,
    bench_commit
);
criterion_main!(benches);
