//! Sync cursor: when the last fully successful pass finished.
//!
//! The cursor is a plain value. Callers load it at startup, hand it to the
//! orchestrator and persist it again after a pass succeeds; the reconciler
//! never touches it.

use crate::error::Result;
use crate::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default time between scheduled passes: 5 minutes.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Persisted bookkeeping of the last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    /// Milliseconds since epoch, 0 when no pass has ever succeeded
    last_sync_at: Timestamp,
    sync_interval_ms: u64,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_INTERVAL_MS)
    }
}

impl SyncCursor {
    /// A cursor that has never recorded a success.
    pub fn new(sync_interval_ms: u64) -> Self {
        Self {
            last_sync_at: 0,
            sync_interval_ms,
        }
    }

    /// Restore a persisted cursor.
    pub fn restore(last_sync_at: Timestamp, sync_interval_ms: u64) -> Self {
        Self {
            last_sync_at,
            sync_interval_ms,
        }
    }

    pub fn last_sync_at(&self) -> Timestamp {
        self.last_sync_at
    }

    pub fn sync_interval_ms(&self) -> u64 {
        self.sync_interval_ms
    }

    pub fn set_sync_interval_ms(&mut self, interval_ms: u64) {
        self.sync_interval_ms = interval_ms;
    }

    pub fn has_synced(&self) -> bool {
        self.last_sync_at > 0
    }

    /// Record a successful pass finishing at `now`. Never moves backwards.
    pub fn record_success(&mut self, now: Timestamp) {
        self.last_sync_at = self.last_sync_at.max(now);
    }

    /// When the next scheduled pass is due.
    pub fn next_due_at(&self) -> Timestamp {
        if !self.has_synced() {
            return 0;
        }
        self.last_sync_at.saturating_add(self.sync_interval_ms)
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.next_due_at()
    }
}

/// Where cursors are persisted between process runs, one per session.
pub trait CursorStore: Send + Sync {
    /// The stored cursor, or a fresh default one.
    fn load(&self, session_id: &str) -> Result<SyncCursor>;

    fn save(&self, session_id: &str, cursor: &SyncCursor) -> Result<()>;
}

/// Cursor store kept in memory, for tests and embedders without storage.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, SyncCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self, session_id: &str) -> Result<SyncCursor> {
        Ok(self
            .cursors
            .lock()
            .get(session_id)
            .copied()
            .unwrap_or_default())
    }

    fn save(&self, session_id: &str, cursor: &SyncCursor) -> Result<()> {
        self.cursors.lock().insert(session_id.to_string(), *cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cursor_is_due() {
        let cursor = SyncCursor::default();
        assert_eq!(cursor.last_sync_at(), 0);
        assert!(!cursor.has_synced());
        assert_eq!(cursor.sync_interval_ms(), 300_000);
        assert!(cursor.is_due(0));
    }

    #[test]
    fn record_success_is_monotonic() {
        let mut cursor = SyncCursor::default();
        cursor.record_success(1_706_745_600_123);
        cursor.record_success(1_706_745_000_000);
        assert_eq!(cursor.last_sync_at(), 1_706_745_600_123);
    }

    #[test]
    fn due_after_interval() {
        let mut cursor = SyncCursor::new(1000);
        cursor.record_success(10_000);
        assert_eq!(cursor.next_due_at(), 11_000);
        assert!(!cursor.is_due(10_999));
        assert!(cursor.is_due(11_000));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load("user-1").unwrap(), SyncCursor::default());

        let mut cursor = SyncCursor::new(60_000);
        cursor.record_success(42);
        store.save("user-1", &cursor).unwrap();

        assert_eq!(store.load("user-1").unwrap(), cursor);
        assert_eq!(store.load("user-2").unwrap(), SyncCursor::default());
    }

    #[test]
    fn serialization_format() {
        let json = serde_json::to_string(&SyncCursor::restore(5, 6)).unwrap();
        assert_eq!(json, r#"{"lastSyncAt":5,"syncIntervalMs":6}"#);
    }
}
