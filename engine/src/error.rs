//! Error types for the Tidesync engine.

use crate::reconcile::ApplyOutcome;
use crate::report::EntityReport;
use crate::{EntityTypeName, SessionId};
use thiserror::Error;

/// A fetched record that could not be decoded into the expected shape.
///
/// These never abort an entity type: the record is skipped and counted in the
/// report instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed record{}: {reason}", key.as_ref().map(|k| format!(" {k}")).unwrap_or_default())]
pub struct DataShapeError {
    /// Best-effort rendering of the record's key, if it could be read at all
    pub key: Option<String>,
    /// What was wrong with the record
    pub reason: String,
}

impl DataShapeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            key: None,
            reason: reason.into(),
        }
    }

    pub fn for_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            reason: reason.into(),
        }
    }
}

/// All errors a store adapter or the engine itself can raise during a pass.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    // Store errors
    #[error("remote store unreachable: {0}")]
    Transport(String),

    #[error("local store failure: {0}")]
    Persistence(String),

    #[error(transparent)]
    DataShape(#[from] DataShapeError),

    // Pass control
    #[error("sync cancelled")]
    Cancelled,

    #[error("sync timed out")]
    TimedOut,
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        SyncError::Persistence(message.into())
    }

    /// Whether a later scheduled pass has a reasonable chance of succeeding.
    ///
    /// Persistence failures are fatal for the current pass but the whole pass
    /// is still retried later, so only data shape errors are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::DataShape(_))
    }
}

/// An applied plan that stopped or finished with an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{cause}")]
pub struct ApplyError {
    /// The first error hit
    pub cause: SyncError,
    /// What was done before giving up, including the failed pushes
    pub outcome: ApplyOutcome,
}

/// A failed entity type, with whatever it reported before failing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{cause}")]
pub struct EntityFailure {
    pub cause: SyncError,
    pub report: EntityReport,
}

/// The single aggregate failure a sync pass surfaces.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("sync failed for session {session_id} on entity type {entity_type}: {cause}")]
pub struct SyncFailure {
    pub session_id: SessionId,
    pub entity_type: EntityTypeName,
    pub cause: SyncError,
    /// Partial counters of the failing entity type
    pub report: EntityReport,
}

impl SyncFailure {
    /// Pushes of the failing entity type that returned an error.
    pub fn failed_pushes(&self) -> usize {
        self.report.failed_pushes
    }
}

/// Errors raised while assembling a registry of entity types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("entity type registered twice: {0}")]
    DuplicateEntityType(EntityTypeName),

    #[error("entity type name must not be empty")]
    EmptyName,
}

/// Result type for store and engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
