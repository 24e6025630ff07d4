//! Entity type descriptors.
//!
//! An [`EntityTypeSpec`] bundles everything the engine needs to sync one
//! record kind: how to read a snapshot from each replica and how to write a
//! single record into each replica. Key, timestamp and tombstone extraction
//! come from the record type's [`Syncable`] implementation.

use crate::cancel::CancelToken;
use crate::error::{EntityFailure, Result};
use crate::reconcile::Reconciler;
use crate::record::Syncable;
use crate::report::EntityReport;
use crate::snapshot::{Side, Snapshot};
use crate::EntityTypeName;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Per-call context threaded into every store adapter call.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext<'a> {
    /// Identity of the session being synced (the signed-in user)
    pub session_id: &'a str,
    pub cancel: &'a CancelToken,
}

impl<'a> SyncContext<'a> {
    pub fn new(session_id: &'a str, cancel: &'a CancelToken) -> Self {
        Self { session_id, cancel }
    }
}

type FetchFn<V> = Arc<dyn Fn(&SyncContext<'_>) -> Result<Snapshot<V>> + Send + Sync>;
type PushFn<V> = Arc<dyn Fn(&SyncContext<'_>, &V) -> Result<()> + Send + Sync>;

/// Immutable descriptor for one record kind, built once at startup.
pub struct EntityTypeSpec<V> {
    name: EntityTypeName,
    fetch_local: FetchFn<V>,
    fetch_remote: FetchFn<V>,
    push_local: PushFn<V>,
    push_remote: PushFn<V>,
}

impl<V> Clone for EntityTypeSpec<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fetch_local: Arc::clone(&self.fetch_local),
            fetch_remote: Arc::clone(&self.fetch_remote),
            push_local: Arc::clone(&self.push_local),
            push_remote: Arc::clone(&self.push_remote),
        }
    }
}

impl<V> fmt::Debug for EntityTypeSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTypeSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<V: Syncable> EntityTypeSpec<V> {
    pub fn new<FL, FR, PL, PR>(
        name: impl Into<EntityTypeName>,
        fetch_local: FL,
        fetch_remote: FR,
        push_local: PL,
        push_remote: PR,
    ) -> Self
    where
        FL: Fn(&SyncContext<'_>) -> Result<Snapshot<V>> + Send + Sync + 'static,
        FR: Fn(&SyncContext<'_>) -> Result<Snapshot<V>> + Send + Sync + 'static,
        PL: Fn(&SyncContext<'_>, &V) -> Result<()> + Send + Sync + 'static,
        PR: Fn(&SyncContext<'_>, &V) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fetch_local: Arc::new(fetch_local),
            fetch_remote: Arc::new(fetch_remote),
            push_local: Arc::new(push_local),
            push_remote: Arc::new(push_remote),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fetch_local(&self, ctx: &SyncContext<'_>) -> Result<Snapshot<V>> {
        (self.fetch_local)(ctx)
    }

    pub fn fetch_remote(&self, ctx: &SyncContext<'_>) -> Result<Snapshot<V>> {
        (self.fetch_remote)(ctx)
    }

    pub fn push_local(&self, ctx: &SyncContext<'_>, value: &V) -> Result<()> {
        (self.push_local)(ctx, value)
    }

    pub fn push_remote(&self, ctx: &SyncContext<'_>, value: &V) -> Result<()> {
        (self.push_remote)(ctx, value)
    }

    fn fetch(&self, ctx: &SyncContext<'_>, side: Side) -> Result<Snapshot<V>> {
        ctx.cancel.checkpoint()?;
        let snapshot = match side {
            Side::Local => self.fetch_local(ctx)?,
            Side::Remote => self.fetch_remote(ctx)?,
        };
        for rejected in &snapshot.rejected {
            tracing::warn!(entity_type = %self.name, %side, "skipping record: {}", rejected);
        }
        Ok(snapshot)
    }
}

/// Object-safe view of an entity type, so specs with different record and
/// key types can share one registry.
pub trait EntitySync: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch both snapshots, reconcile them and apply the decisions.
    fn sync(
        &self,
        ctx: &SyncContext<'_>,
        reconciler: &Reconciler,
    ) -> std::result::Result<EntityReport, EntityFailure>;
}

impl<V: Syncable> EntitySync for EntityTypeSpec<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(
        &self,
        ctx: &SyncContext<'_>,
        reconciler: &Reconciler,
    ) -> std::result::Result<EntityReport, EntityFailure> {
        let started = Instant::now();
        let mut report = EntityReport::new(self.name.clone());

        let fetched = self
            .fetch(ctx, Side::Local)
            .and_then(|local| Ok((local, self.fetch(ctx, Side::Remote)?)));
        let (local, remote) = match fetched {
            Ok(snapshots) => snapshots,
            Err(cause) => return Err(EntityFailure { cause, report }),
        };

        report.malformed_local = local.rejected_count();
        report.malformed_remote = remote.rejected_count();

        let plan = reconciler.reconcile(local.records, remote.records);
        report.duplicates = plan.duplicates;
        tracing::debug!(
            entity_type = %self.name,
            uploads = plan.uploads(),
            downloads = plan.downloads(),
            skips = plan.skips(),
            "planned"
        );

        let outcome = match reconciler.apply(
            plan,
            ctx.cancel,
            |value| self.push_local(ctx, value),
            |value| self.push_remote(ctx, value),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(EntityFailure {
                    cause: err.cause,
                    report: report.with_outcome(err.outcome),
                })
            }
        };
        let report = report.with_outcome(outcome);

        tracing::info!(
            entity_type = %self.name,
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            skipped = report.skipped,
            malformed = report.malformed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "entity type synced"
        );
        Ok(report)
    }
}
