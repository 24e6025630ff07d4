//! Reconciliation of a local and a remote snapshot of one entity type.
//!
//! This is the core of the engine. Given two unordered snapshots, it decides
//! per key whether the local copy goes out, the remote copy comes in, or
//! nothing happens.
//!
//! # Algorithm
//!
//! 1. Index the remote records by key
//! 2. For every local record, compare it with its remote counterpart:
//!    - no counterpart: upload
//!    - a tombstone on either side wins over a live record, whatever the
//!      timestamps; two tombstones are left alone
//!    - otherwise the strictly greater `updated_at` wins, equal means in sync
//! 3. Remote records never seen locally are downloaded, unless they are
//!    tombstones (there is nothing to delete locally)
//! 4. Apply: uploads go to the remote store, downloads to the local store
//!
//! Planning is pure. Applying calls the supplied push functions and checks the
//! cancel token before each one.

use crate::cancel::CancelToken;
use crate::error::{ApplyError, SyncError};
use crate::record::Syncable;
use crate::snapshot::Side;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// What to do when a push fails part way through an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplyPolicy {
    /// Stop at the first failed push (default). Pushes already made stay.
    #[default]
    FailFast,
    /// Push everything, count the failed pushes, then fail with the first
    /// error if any push failed. Cancellation still stops immediately.
    ContinueOnError,
}

/// Why a key needs no write in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Both live with equal timestamps. Content is not compared.
    InSync,
    /// Deleted on both sides.
    BothDeleted,
    /// A remote tombstone for a key the local store never had.
    RemoteTombstoneOnly,
}

/// The verdict for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<V: Syncable> {
    /// Push this local value to the remote store
    Upload(V),
    /// Write this remote value into the local store
    Download(V),
    /// No I/O
    Skip { key: V::Key, reason: SkipReason },
}

impl<V: Syncable> Decision<V> {
    pub fn key(&self) -> V::Key {
        match self {
            Decision::Upload(value) | Decision::Download(value) => value.key(),
            Decision::Skip { key, .. } => key.clone(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip { .. })
    }
}

/// Decisions for one entity type, one per key of `locals ∪ remotes`.
///
/// Ordered by first appearance: local snapshot order, then remote-only keys in
/// remote snapshot order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan<V: Syncable> {
    pub decisions: Vec<Decision<V>>,
    /// Records dropped because their key appeared twice in one snapshot
    pub duplicates: usize,
}

impl<V: Syncable> ReconcilePlan<V> {
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn uploads(&self) -> usize {
        self.count(|d| matches!(d, Decision::Upload(_)))
    }

    pub fn downloads(&self) -> usize {
        self.count(|d| matches!(d, Decision::Download(_)))
    }

    pub fn skips(&self) -> usize {
        self.count(Decision::is_skip)
    }

    /// Whether applying this plan would write anything.
    pub fn has_writes(&self) -> bool {
        self.decisions.iter().any(|d| !d.is_skip())
    }

    fn count(&self, pred: impl Fn(&Decision<V>) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(d)).count()
    }
}

/// Counts of what an applied plan actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// Pushes that returned an error
    #[serde(default)]
    pub failed: usize,
}

/// The reconciler plans and applies decisions for one entity type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: ApplyPolicy,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(policy: ApplyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Compute one decision per key. Performs no I/O.
    pub fn reconcile<V: Syncable>(&self, locals: Vec<V>, remotes: Vec<V>) -> ReconcilePlan<V> {
        let (locals, local_dups) = collapse_duplicates(locals, Side::Local);
        let (remotes, remote_dups) = collapse_duplicates(remotes, Side::Remote);

        let remote_index: HashMap<V::Key, usize> = remotes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();
        // A slot is emptied once its key has been matched by a local record.
        let mut remote_slots: Vec<Option<V>> = remotes.into_iter().map(Some).collect();

        let mut decisions = Vec::with_capacity(locals.len() + remote_slots.len());

        for local in locals {
            let counterpart = remote_index
                .get(&local.key())
                .and_then(|&i| remote_slots[i].take());

            let decision = match counterpart {
                None => Decision::Upload(local),
                Some(remote) => decide_pair(local, remote),
            };
            decisions.push(decision);
        }

        for remote in remote_slots.into_iter().flatten() {
            let decision = if remote.is_deleted() {
                Decision::Skip {
                    key: remote.key(),
                    reason: SkipReason::RemoteTombstoneOnly,
                }
            } else {
                Decision::Download(remote)
            };
            decisions.push(decision);
        }

        ReconcilePlan {
            decisions,
            duplicates: local_dups + remote_dups,
        }
    }

    /// Apply a plan: uploads through `push_remote`, downloads through
    /// `push_local`.
    ///
    /// There is no rollback: whatever was pushed before a failure stays. The
    /// error carries the counts reached so far.
    pub fn apply<V, L, R>(
        &self,
        plan: ReconcilePlan<V>,
        cancel: &CancelToken,
        mut push_local: L,
        mut push_remote: R,
    ) -> Result<ApplyOutcome, ApplyError>
    where
        V: Syncable,
        L: FnMut(&V) -> crate::error::Result<()>,
        R: FnMut(&V) -> crate::error::Result<()>,
    {
        let mut outcome = ApplyOutcome::default();
        let mut first_error: Option<SyncError> = None;

        for decision in &plan.decisions {
            if let Decision::Skip { key, reason } = decision {
                tracing::trace!(?key, ?reason, "skip");
                outcome.skipped += 1;
                continue;
            }
            if let Err(cause) = cancel.checkpoint() {
                return Err(ApplyError { cause, outcome });
            }

            let result = match decision {
                Decision::Upload(value) => {
                    tracing::debug!(key = ?value.key(), updated_at = value.updated_at(), "upload");
                    push_remote(value).map(|()| outcome.uploaded += 1)
                }
                Decision::Download(value) => {
                    tracing::debug!(key = ?value.key(), updated_at = value.updated_at(), "download");
                    push_local(value).map(|()| outcome.downloaded += 1)
                }
                Decision::Skip { .. } => continue,
            };

            if let Err(err) = result {
                outcome.failed += 1;
                let interrupted = matches!(err, SyncError::Cancelled | SyncError::TimedOut);
                if self.policy == ApplyPolicy::FailFast || interrupted {
                    tracing::debug!(
                        key = ?decision.key(),
                        uploaded = outcome.uploaded,
                        downloaded = outcome.downloaded,
                        "push failed, abandoning remaining decisions: {}",
                        err
                    );
                    return Err(ApplyError { cause: err, outcome });
                }
                tracing::warn!(key = ?decision.key(), "push failed, continuing: {}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(cause) => {
                tracing::warn!(failed = outcome.failed, "{} pushes failed", outcome.failed);
                Err(ApplyError { cause, outcome })
            }
            None => Ok(outcome),
        }
    }
}

fn decide_pair<V: Syncable>(local: V, remote: V) -> Decision<V> {
    match (local.is_deleted(), remote.is_deleted()) {
        (false, true) => Decision::Download(remote),
        (true, false) => Decision::Upload(local),
        (true, true) => Decision::Skip {
            key: local.key(),
            reason: SkipReason::BothDeleted,
        },
        (false, false) => match local.updated_at().cmp(&remote.updated_at()) {
            Ordering::Greater => Decision::Upload(local),
            Ordering::Less => Decision::Download(remote),
            Ordering::Equal => Decision::Skip {
                key: local.key(),
                reason: SkipReason::InSync,
            },
        },
    }
}

/// Keep one record per key, preserving first-seen order.
///
/// Keys are unique per store, so duplicates mean a broken adapter. The newest
/// record survives and a tombstone beats a live record with the same stamp.
fn collapse_duplicates<V: Syncable>(records: Vec<V>, side: Side) -> (Vec<V>, usize) {
    let mut seen: HashMap<V::Key, usize> = HashMap::with_capacity(records.len());
    let mut kept: Vec<V> = Vec::with_capacity(records.len());
    let mut dropped = 0;

    for record in records {
        let key = record.key();
        match seen.get(&key) {
            Some(&i) => {
                dropped += 1;
                tracing::warn!(?key, %side, "duplicate key in snapshot");
                if supersedes(&record, &kept[i]) {
                    kept[i] = record;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(record);
            }
        }
    }

    (kept, dropped)
}

fn supersedes<V: Syncable>(candidate: &V, current: &V) -> bool {
    (candidate.updated_at(), candidate.is_deleted()) > (current.updated_at(), current.is_deleted())
}
