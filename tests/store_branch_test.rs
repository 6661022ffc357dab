use proptest::prelude::*;
use std::collections::BTreeMap;
use txpipe::*;

#[derive(Debug, Clone)]
enum Op {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

fn arbitrary_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..3)
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arbitrary_key(), prop::collection::vec(any::<u8>(), 0..4)).prop_map(|(k, v)| Op::Set(k, v)),
        arbitrary_key().prop_map(Op::Delete),
    ]
}

fn apply(store: &dyn KVStore, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Set(k, v) => store.set(k, v).unwrap(),
            Op::Delete(k) => store.delete(k).unwrap(),
        }
    }
}

fn model(initial: &[Op], ops: &[Op]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut map = BTreeMap::new();
    for op in initial.iter().chain(ops) {
        match op {
            Op::Set(k, v) => {
                map.insert(k.clone(), v.clone());
            }
            Op::Delete(k) => {
                map.remove(k);
            }
        }
    }
    map
}

fn seeded(initial: &[Op]) -> StoreHandle {
    let store = StoreHandle::new(MemStore::new());
    apply(&*store, initial);
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A branch reads like the parent with its own writes applied on top
    #[test]
    fn property_branch_view_matches_model(
        initial in prop::collection::vec(arbitrary_op(), 0..20),
        ops in prop::collection::vec(arbitrary_op(), 0..20)
    ) {
        let root = seeded(&initial);
        let branch = root.branch(None);
        apply(&*branch, &ops);

        let expected: Vec<(Vec<u8>, Vec<u8>)> = model(&initial, &ops).into_iter().collect();
        prop_assert_eq!(branch.prefix_scan(&[]).unwrap(), expected);

        // Parent untouched until write
        let before: Vec<(Vec<u8>, Vec<u8>)> = model(&initial, &[]).into_iter().collect();
        prop_assert_eq!(root.prefix_scan(&[]).unwrap(), before);
    }

    /// Writing a branch gives the same store as applying its ops directly
    #[test]
    fn property_write_equals_direct_apply(
        initial in prop::collection::vec(arbitrary_op(), 0..20),
        ops in prop::collection::vec(arbitrary_op(), 0..20)
    ) {
        let hasher = StoreHasher::new();

        let branched = seeded(&initial);
        let branch = branched.branch(None);
        apply(&*branch, &ops);
        branch.write().unwrap();
        prop_assert_eq!(branch.pending_writes().unwrap(), 0);

        let direct = seeded(&initial);
        apply(&*direct, &ops);

        prop_assert_eq!(
            hasher.hash_store(&*branched).unwrap(),
            hasher.hash_store(&*direct).unwrap()
        );
    }

    /// Nested branches only reach the root once every level is written
    #[test]
    fn property_nested_branches(
        initial in prop::collection::vec(arbitrary_op(), 0..10),
        outer_ops in prop::collection::vec(arbitrary_op(), 0..10),
        inner_ops in prop::collection::vec(arbitrary_op(), 0..10)
    ) {
        let root = seeded(&initial);
        let outer = root.branch(None);
        apply(&*outer, &outer_ops);

        let inner = StoreHandle::from(outer.clone()).branch(None);
        apply(&*inner, &inner_ops);
        inner.write().unwrap();

        let root_before: Vec<(Vec<u8>, Vec<u8>)> = model(&initial, &[]).into_iter().collect();
        prop_assert_eq!(root.prefix_scan(&[]).unwrap(), root_before);

        outer.write().unwrap();
        let all_ops: Vec<Op> = outer_ops.iter().chain(&inner_ops).cloned().collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model(&initial, &all_ops).into_iter().collect();
        prop_assert_eq!(root.prefix_scan(&[]).unwrap(), expected);
    }
}

#[test]
fn test_discard_drops_buffered_changes() {
    let root = seeded(&[Op::Set(b"a".to_vec(), b"1".to_vec())]);
    let branch = root.branch(None);
    branch.set(b"b", b"2").unwrap();
    branch.delete(b"a").unwrap();

    assert_eq!(branch.discard().unwrap(), 2);
    assert_eq!(branch.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert!(!branch.has(b"b").unwrap());
}

#[test]
fn test_tracer_exports_json_lines() {
    let tracer = Tracer::new();
    let root = StoreHandle::new(MemStore::with_tracer(tracer.clone()));
    let mut trace = TraceContext::new();
    trace.insert("txHash".to_string(), serde_json::json!("ABCD"));

    let branch = root.branch(Some(trace));
    branch.set(b"k", b"v").unwrap();
    branch.write().unwrap();

    let lines = tracer.to_json_lines().unwrap();
    let parsed: Vec<serde_json::Value> = lines
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0]["operation"], "write");
    assert_eq!(parsed[0]["key"], hex::encode(b"k"));
    assert_eq!(parsed[0]["metadata"]["txHash"], "ABCD");
    assert!(parsed[1]["metadata"].as_object().unwrap().is_empty());
}
