//! Branchable key/value store
//!
//! `MemStore` is a root in-memory store. `CacheStore` is a copy-on-write branch
//! over any other store: reads fall through to the parent unless shadowed by a
//! buffered write, and nothing reaches the parent until `write` is called.
//! Dropping a branch without writing it discards its changes.

use crate::error::{SerializationError, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};

/// Debugging metadata attached to traced store operations
pub type TraceContext = BTreeMap<String, serde_json::Value>;

/// A buffered change: `Some` sets the value, `None` deletes the key
pub type StoreChange = (Vec<u8>, Option<Vec<u8>>);

/// Kind of traced store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceOp {
    Read,
    Write,
    Delete,
}

/// One traced store operation, keys and values hex encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOperation {
    pub operation: TraceOp,
    pub key: String,
    pub value: Option<String>,
    pub metadata: TraceContext,
}

/// Shared sink for traced store operations
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    operations: Arc<Mutex<Vec<TraceOperation>>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: TraceOp, key: &[u8], value: Option<&[u8]>, metadata: &TraceContext) {
        let op = TraceOperation {
            operation,
            key: hex::encode(key),
            value: value.map(hex::encode),
            metadata: metadata.clone(),
        };
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(op);
    }

    pub fn operations(&self) -> Vec<TraceOperation> {
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render every recorded operation as one JSON object per line
    pub fn to_json_lines(&self) -> Result<String, SerializationError> {
        let mut out = String::new();
        for op in self.operations() {
            let line = serde_json::to_string(&op).map_err(|e| SerializationError::EncodeFailed {
                reason: format!("trace operation: {}", e),
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Contract every store in the pipeline satisfies
pub trait KVStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All live entries whose key starts with `prefix`, in key order
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply a batch of changes. Implementations apply it under a single lock.
    fn apply_batch(&self, changes: Vec<StoreChange>) -> Result<(), StoreError> {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(&key, &value)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }

    fn tracer(&self) -> Option<Tracer> {
        None
    }

    fn tracing_enabled(&self) -> bool {
        self.tracer().is_some()
    }
}

fn poisoned(store: &str) -> StoreError {
    StoreError::LockPoisoned {
        store: store.to_string(),
    }
}

/// Root in-memory store
#[derive(Debug, Default)]
pub struct MemStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    tracer: Option<Tracer>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that records every operation, and every operation of its branches, into `tracer`
    pub fn with_tracer(tracer: Tracer) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            tracer: Some(tracer),
        }
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.data.read().map_err(|_| poisoned("mem"))?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn trace(&self, op: TraceOp, key: &[u8], value: Option<&[u8]>) {
        if let Some(tracer) = &self.tracer {
            tracer.record(op, key, value, &TraceContext::new());
        }
    }
}

impl KVStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.data.read().map_err(|_| poisoned("mem"))?.get(key).cloned();
        self.trace(TraceOp::Read, key, value.as_deref());
        Ok(value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data
            .write()
            .map_err(|_| poisoned("mem"))?
            .insert(key.to_vec(), value.to_vec());
        self.trace(TraceOp::Write, key, Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.data.write().map_err(|_| poisoned("mem"))?.remove(key);
        self.trace(TraceOp::Delete, key, None);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let data = self.data.read().map_err(|_| poisoned("mem"))?;
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply_batch(&self, changes: Vec<StoreChange>) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| poisoned("mem"))?;
        for (key, value) in changes {
            match value {
                Some(value) => {
                    self.trace(TraceOp::Write, &key, Some(&value));
                    data.insert(key, value);
                }
                None => {
                    self.trace(TraceOp::Delete, &key, None);
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }
}

/// Cheaply clonable reference to a store, compared by identity
#[derive(Clone)]
pub struct StoreHandle(Arc<dyn KVStore>);

impl StoreHandle {
    pub fn new<S: KVStore + 'static>(store: S) -> Self {
        Self(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn KVStore>) -> Self {
        Self(store)
    }

    /// True if both handles refer to the same store object
    pub fn ptr_eq(&self, other: &StoreHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }

    /// Open a copy-on-write branch over this store
    pub fn branch(&self, trace_context: Option<TraceContext>) -> Arc<CacheStore> {
        Arc::new(CacheStore::new(self.clone(), trace_context))
    }
}

impl Deref for StoreHandle {
    type Target = dyn KVStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl From<Arc<CacheStore>> for StoreHandle {
    fn from(store: Arc<CacheStore>) -> Self {
        Self(store)
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Copy-on-write branch over a parent store
pub struct CacheStore {
    parent: StoreHandle,
    writes: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    tracer: Option<Tracer>,
    trace_context: TraceContext,
}

impl CacheStore {
    /// Branches inherit the parent's tracer. `trace_context` is only kept when tracing is on.
    pub fn new(parent: StoreHandle, trace_context: Option<TraceContext>) -> Self {
        let tracer = parent.tracer();
        let trace_context = match (&tracer, trace_context) {
            (Some(_), Some(ctx)) => ctx,
            _ => TraceContext::new(),
        };

        Self {
            parent,
            writes: RwLock::new(BTreeMap::new()),
            tracer,
            trace_context,
        }
    }

    pub fn parent(&self) -> &StoreHandle {
        &self.parent
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace_context
    }

    /// Number of buffered changes not yet written to the parent
    pub fn pending_writes(&self) -> Result<usize, StoreError> {
        Ok(self.writes.read().map_err(|_| poisoned("cache"))?.len())
    }

    /// Flush buffered changes into the parent in key order and clear the buffer.
    ///
    /// Returns the number of changes written.
    pub fn write(&self) -> Result<usize, StoreError> {
        let mut writes = self.writes.write().map_err(|_| poisoned("cache"))?;
        let batch: Vec<StoreChange> = std::mem::take(&mut *writes).into_iter().collect();
        let count = batch.len();
        self.parent.apply_batch(batch)?;
        Ok(count)
    }

    /// Drop buffered changes without touching the parent
    pub fn discard(&self) -> Result<usize, StoreError> {
        let mut writes = self.writes.write().map_err(|_| poisoned("cache"))?;
        let count = writes.len();
        writes.clear();
        Ok(count)
    }

    fn trace(&self, op: TraceOp, key: &[u8], value: Option<&[u8]>) {
        if let Some(tracer) = &self.tracer {
            tracer.record(op, key, value, &self.trace_context);
        }
    }
}

impl KVStore for CacheStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cached = self
            .writes
            .read()
            .map_err(|_| poisoned("cache"))?
            .get(key)
            .cloned();

        let value = match cached {
            Some(value) => value,
            None => self.parent.get(key)?,
        };
        self.trace(TraceOp::Read, key, value.as_deref());
        Ok(value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.writes
            .write()
            .map_err(|_| poisoned("cache"))?
            .insert(key.to_vec(), Some(value.to_vec()));
        self.trace(TraceOp::Write, key, Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.writes
            .write()
            .map_err(|_| poisoned("cache"))?
            .insert(key.to_vec(), None);
        self.trace(TraceOp::Delete, key, None);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.prefix_scan(prefix)?.into_iter().collect();

        let writes = self.writes.read().map_err(|_| poisoned("cache"))?;
        for (key, value) in writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn apply_batch(&self, changes: Vec<StoreChange>) -> Result<(), StoreError> {
        let mut writes = self.writes.write().map_err(|_| poisoned("cache"))?;
        for (key, value) in changes {
            match &value {
                Some(v) => self.trace(TraceOp::Write, &key, Some(v)),
                None => self.trace(TraceOp::Delete, &key, None),
            }
            writes.insert(key, value);
        }
        Ok(())
    }

    fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("parent", &self.parent)
            .field("pending", &self.writes.read().map(|w| w.len()).unwrap_or(0))
            .field("traced", &self.tracer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_writes_invisible_until_written() {
        let root = StoreHandle::new(MemStore::new());
        root.set(b"a", b"1").unwrap();

        let branch = root.branch(None);
        branch.set(b"a", b"2").unwrap();
        branch.set(b"b", b"3").unwrap();

        assert_eq!(root.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(root.get(b"b").unwrap(), None);
        assert_eq!(branch.get(b"a").unwrap(), Some(b"2".to_vec()));

        assert_eq!(branch.write().unwrap(), 2);
        assert_eq!(root.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(root.get(b"b").unwrap(), Some(b"3".to_vec()));
        assert_eq!(branch.pending_writes().unwrap(), 0);
    }

    #[test]
    fn test_dropped_branch_leaves_parent_untouched() {
        let root = StoreHandle::new(MemStore::new());
        root.set(b"a", b"1").unwrap();
        {
            let branch = root.branch(None);
            branch.delete(b"a").unwrap();
            assert_eq!(branch.get(b"a").unwrap(), None);
        }
        assert_eq!(root.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_delete_shadows_parent_in_scan() {
        let root = StoreHandle::new(MemStore::new());
        root.set(b"p/1", b"x").unwrap();
        root.set(b"p/2", b"y").unwrap();
        root.set(b"q/1", b"z").unwrap();

        let branch = root.branch(None);
        branch.delete(b"p/1").unwrap();
        branch.set(b"p/3", b"w").unwrap();

        let keys: Vec<Vec<u8>> = branch
            .prefix_scan(b"p/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p/2".to_vec(), b"p/3".to_vec()]);
    }

    #[test]
    fn test_nested_branches_merge_one_level_at_a_time() {
        let root = StoreHandle::new(MemStore::new());
        let outer = root.branch(None);
        let inner = StoreHandle::from(outer.clone()).branch(None);

        inner.set(b"k", b"v").unwrap();
        inner.write().unwrap();
        assert_eq!(outer.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(root.get(b"k").unwrap(), None);

        outer.write().unwrap();
        assert_eq!(root.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_handle_identity() {
        let root = StoreHandle::new(MemStore::new());
        let copy = root.clone();
        let branch: StoreHandle = root.branch(None).into();

        assert!(root.ptr_eq(&copy));
        assert!(!root.ptr_eq(&branch));
    }

    #[test]
    fn test_trace_context_only_kept_when_tracing() {
        let mut ctx = TraceContext::new();
        ctx.insert("txHash".to_string(), serde_json::json!("ABC"));

        let plain = StoreHandle::new(MemStore::new());
        assert!(!plain.tracing_enabled());
        assert!(plain.branch(Some(ctx.clone())).trace_context().is_empty());

        let tracer = Tracer::new();
        let traced = StoreHandle::new(MemStore::with_tracer(tracer.clone()));
        let branch = traced.branch(Some(ctx));
        assert!(branch.tracing_enabled());

        branch.set(b"k", b"v").unwrap();
        let ops = tracer.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, TraceOp::Write);
        assert_eq!(ops[0].metadata["txHash"], serde_json::json!("ABC"));
    }

    #[test]
    fn test_trace_json_lines() {
        let tracer = Tracer::new();
        let store = MemStore::with_tracer(tracer.clone());
        store.set(b"k", b"v").unwrap();
        store.get(b"k").unwrap();

        let lines = tracer.to_json_lines().unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.contains("\"operation\":\"write\""));
        assert!(lines.contains("\"operation\":\"read\""));
    }
}
