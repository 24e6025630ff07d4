//! Reports handed back to the caller after a sync pass.

use crate::reconcile::ApplyOutcome;
use crate::{EntityTypeName, SessionId};
use serde::{Deserialize, Serialize};

/// What one entity type did during a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    pub entity_type: EntityTypeName,
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// Local records skipped because they could not be decoded
    pub malformed_local: usize,
    /// Remote records skipped because they could not be decoded
    pub malformed_remote: usize,
    /// Records dropped because their key appeared twice in one snapshot
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duplicates: usize,
    /// Pushes that returned an error; only a failed entity type has any
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_pushes: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl EntityReport {
    pub fn new(entity_type: impl Into<EntityTypeName>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    pub(crate) fn with_outcome(mut self, outcome: ApplyOutcome) -> Self {
        self.uploaded = outcome.uploaded;
        self.downloaded = outcome.downloaded;
        self.skipped = outcome.skipped;
        self.failed_pushes = outcome.failed;
        self
    }

    pub fn malformed(&self) -> usize {
        self.malformed_local + self.malformed_remote
    }

    /// Whether nothing was written in either direction.
    pub fn is_idle(&self) -> bool {
        self.uploaded == 0 && self.downloaded == 0
    }
}

/// Per-type counters for one successful pass, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub session_id: SessionId,
    pub entity_types: Vec<EntityReport>,
}

impl SyncReport {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            entity_types: Vec::new(),
        }
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityReport> {
        self.entity_types
            .iter()
            .find(|r| r.entity_type == entity_type)
    }

    pub fn uploaded(&self) -> usize {
        self.entity_types.iter().map(|r| r.uploaded).sum()
    }

    pub fn downloaded(&self) -> usize {
        self.entity_types.iter().map(|r| r.downloaded).sum()
    }

    pub fn skipped(&self) -> usize {
        self.entity_types.iter().map(|r| r.skipped).sum()
    }

    pub fn malformed(&self) -> usize {
        self.entity_types.iter().map(EntityReport::malformed).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.entity_types.iter().all(EntityReport::is_idle)
    }
}
