//! # Tidesync Engine
//!
//! A last-write-wins reconciliation engine for keeping a local replica of many
//! independent record collections in step with a remote, authoritative one.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never talks to a database or network itself; store
//!   adapters are plugged in per entity type
//! - **Deterministic**: the same two snapshots always produce the same plan
//! - **Never resurrect**: a tombstone is never overwritten by a live record
//! - **Fail fast**: the first failing entity type fails the whole pass
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] carries a key, an `updated_at` timestamp (milliseconds since
//! epoch), a tombstone flag and an opaque JSON payload. Keys are scalar
//! strings, scalar integers or a structured [`CompositeKey`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] turns a local and a remote snapshot into one
//! [`Decision`] per key - upload, download or skip - and applies them through
//! the push functions of an [`EntityTypeSpec`].
//!
//! ### Orchestration
//!
//! The [`SyncOrchestrator`] runs every entity type of a [`Registry`] for one
//! session, on a bounded pool of worker threads, and returns a [`SyncReport`]
//! or a single [`SyncFailure`]. The caller advances its [`SyncCursor`] only
//! after a successful pass.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidesync_engine::{
//!     CancelToken, EntityTypeSpec, MemoryStore, Record, Registry, SyncCursor,
//!     SyncOrchestrator,
//! };
//! use serde_json::json;
//!
//! // 1. Two replicas of the "exercises" collection
//! let local: MemoryStore<String> =
//!     MemoryStore::with_records([Record::new("ex1", json!({"name": "Squat"}), 100)]);
//! let remote: MemoryStore<String> = MemoryStore::new();
//!
//! // 2. Register the entity type
//! let mut registry = Registry::new();
//! registry
//!     .register(EntityTypeSpec::in_memory("exercises", local.clone(), remote.clone()))
//!     .unwrap();
//!
//! // 3. Run a pass for a session
//! let orchestrator = SyncOrchestrator::new(registry);
//! let report = orchestrator.sync("user-1", &CancelToken::new()).unwrap();
//! assert_eq!(report.uploaded(), 1);
//! assert_eq!(remote.get(&"ex1".to_string()).unwrap().updated_at, 100);
//!
//! // 4. Only now advance the cursor
//! let mut cursor = SyncCursor::default();
//! cursor.record_success(1_706_745_600_000);
//! ```

pub mod cancel;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod key;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cancel::CancelToken;
pub use cursor::{CursorStore, MemoryCursorStore, SyncCursor, DEFAULT_SYNC_INTERVAL_MS};
pub use entity::{EntitySync, EntityTypeSpec, SyncContext};
pub use error::{
    ApplyError, DataShapeError, EntityFailure, RegistryError, SyncError, SyncFailure,
};
pub use key::{CompositeKey, RecordKey};
pub use orchestrator::{SyncOptions, SyncOrchestrator, DEFAULT_MAX_WORKERS};
pub use reconcile::{
    ApplyOutcome, ApplyPolicy, Decision, ReconcilePlan, Reconciler, SkipReason,
};
pub use record::{Record, Syncable};
pub use registry::Registry;
pub use report::{EntityReport, SyncReport};
pub use snapshot::{Side, Snapshot};
pub use store::MemoryStore;

/// Type aliases for clarity
pub type SessionId = String;
pub type EntityTypeName = String;
pub type Timestamp = u64;
