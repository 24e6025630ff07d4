//! Record types for storing data.

use crate::key::RecordKey;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Anything the reconciler can compare: it has a key, a last-modified
/// timestamp and a tombstone flag.
pub trait Syncable: Clone + Send + Sync + 'static {
    type Key: RecordKey;

    fn key(&self) -> Self::Key;

    /// When this value was last written (milliseconds since epoch)
    fn updated_at(&self) -> Timestamp;

    fn is_deleted(&self) -> bool;
}

/// A record in one of the two replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<K> {
    /// Unique identifier within one entity type and one store
    pub key: K,
    /// Set by the mutating side on every create, update and delete
    pub updated_at: Timestamp,
    /// Soft delete flag (tombstone)
    pub deleted: bool,
    /// Entity-specific fields, opaque to the engine
    pub payload: serde_json::Value,
}

impl<K> Record<K> {
    /// Create a live record.
    pub fn new(key: impl Into<K>, payload: serde_json::Value, updated_at: Timestamp) -> Self {
        Self {
            key: key.into(),
            updated_at,
            deleted: false,
            payload,
        }
    }

    /// Create a tombstone.
    pub fn tombstone(key: impl Into<K>, updated_at: Timestamp) -> Self {
        Self {
            key: key.into(),
            updated_at,
            deleted: true,
            payload: serde_json::Value::Null,
        }
    }

    /// Check if record is active (not deleted).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

impl<K: RecordKey> Syncable for Record<K> {
    type Key = K;

    fn key(&self) -> K {
        self.key.clone()
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
