//! In-memory store adapter.
//!
//! [`MemoryStore`] is a replica held in a `HashMap`. Clones share the same
//! state, so one handle can be wired into an [`EntityTypeSpec`] while another
//! is kept for inspection. Reads and writes can be made to fail on demand.

use crate::entity::EntityTypeSpec;
use crate::error::{Result, SyncError};
use crate::key::RecordKey;
use crate::record::Record;
use crate::snapshot::Snapshot;
use crate::EntityTypeName;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct State<K> {
    records: HashMap<K, Record<K>>,
    writes: usize,
    /// Remaining successful writes before `write_error` kicks in
    writes_left: Option<usize>,
    write_error: Option<SyncError>,
    read_error: Option<SyncError>,
}

/// A replica of one entity type, held in memory.
#[derive(Debug)]
pub struct MemoryStore<K> {
    state: Arc<Mutex<State<K>>>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: RecordKey> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RecordKey> MemoryStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                records: HashMap::new(),
                writes: 0,
                writes_left: None,
                write_error: None,
                read_error: None,
            })),
        }
    }

    /// Create a store holding `records`. Seeding does not count as writes.
    pub fn with_records(records: impl IntoIterator<Item = Record<K>>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for record in records {
                state.records.insert(record.key.clone(), record);
            }
        }
        store
    }

    /// Every record, tombstones included, in no particular order.
    pub fn fetch_all(&self) -> Result<Vec<Record<K>>> {
        let state = self.state.lock();
        if let Some(err) = &state.read_error {
            return Err(err.clone());
        }
        Ok(state.records.values().cloned().collect())
    }

    /// Insert or replace the record with the same key.
    pub fn upsert(&self, record: &Record<K>) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(left) = state.writes_left.as_mut() {
            if *left == 0 {
                return Err(state
                    .write_error
                    .clone()
                    .unwrap_or_else(|| SyncError::persistence("write rejected")));
            }
            *left -= 1;
        }
        state.writes += 1;
        state.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    /// Get a record by key.
    pub fn get(&self, key: &K) -> Option<Record<K>> {
        self.state.lock().records.get(key).cloned()
    }

    /// Count of records, tombstones included.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful writes since creation.
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    /// Let `count` more writes succeed, then fail every write with `error`.
    pub fn fail_writes_after(&self, count: usize, error: SyncError) {
        let mut state = self.state.lock();
        state.writes_left = Some(count);
        state.write_error = Some(error);
    }

    /// Fail every read with `error`.
    pub fn fail_reads(&self, error: SyncError) {
        self.state.lock().read_error = Some(error);
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.writes_left = None;
        state.write_error = None;
        state.read_error = None;
    }
}

impl<K: RecordKey> EntityTypeSpec<Record<K>> {
    /// An entity type syncing two in-memory stores.
    pub fn in_memory(
        name: impl Into<EntityTypeName>,
        local: MemoryStore<K>,
        remote: MemoryStore<K>,
    ) -> Self {
        let (fetch_local, push_local) = (local.clone(), local);
        let (fetch_remote, push_remote) = (remote.clone(), remote);
        EntityTypeSpec::new(
            name,
            move |_| fetch_local.fetch_all().map(Snapshot::new),
            move |_| fetch_remote.fetch_all().map(Snapshot::new),
            move |_, record| push_local.upsert(record),
            move |_, record| push_remote.upsert(record),
        )
    }
}
