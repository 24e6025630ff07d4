//! Store adapters backing every entity type.
//!
//! The engine calls its adapters synchronously from worker threads, while the
//! database drivers are async. [`Bridge`] blocks on the runtime from those
//! threads, bounded by whatever time the pass has left.

use crate::db::{self, LocalPool, RemotePool, StoredRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tidesync_engine::error::Result;
use tidesync_engine::{CancelToken, Record, Snapshot, SyncContext, SyncError};
use tokio::runtime::Handle;

/// Runs async database calls to completion from a blocking thread.
///
/// Must not be used from inside the runtime itself; callers hop onto a
/// blocking thread first with `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct Bridge {
    handle: Handle,
}

impl Bridge {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bridge onto the runtime the caller is running in.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Drive `fut` to completion, giving up when `cancel` fires or its
    /// deadline passes.
    pub fn block_on<T, E, F>(
        &self,
        cancel: &CancelToken,
        fut: F,
        map_err: impl FnOnce(E) -> SyncError,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        cancel.checkpoint()?;
        let result = match cancel.remaining() {
            Some(left) => self
                .handle
                .block_on(async move { tokio::time::timeout(left, fut).await })
                .map_err(|_| SyncError::TimedOut)?,
            None => self.handle.block_on(fut),
        };
        result.map_err(map_err)
    }
}

pub(crate) fn local_error(err: sqlx::Error) -> SyncError {
    SyncError::persistence(err.to_string())
}

pub(crate) fn remote_error(err: sqlx::Error) -> SyncError {
    SyncError::transport(err.to_string())
}

/// Both replicas, shared by every entity type of the catalog.
#[derive(Debug, Clone)]
pub struct SqlStores {
    local: LocalPool,
    remote: RemotePool,
    bridge: Bridge,
}

impl SqlStores {
    pub fn new(local: LocalPool, remote: RemotePool, bridge: Bridge) -> Self {
        Self {
            local,
            remote,
            bridge,
        }
    }

    pub fn fetch_local<K: DeserializeOwned>(
        &self,
        ctx: &SyncContext<'_>,
        collection: &str,
    ) -> Result<Snapshot<Record<K>>> {
        let rows = self.bridge.block_on(
            ctx.cancel,
            db::fetch_local(&self.local, ctx.session_id, collection),
            local_error,
        )?;
        Ok(Snapshot::decode(rows.iter().map(StoredRecord::decode::<K>)))
    }

    pub fn fetch_remote<K: DeserializeOwned>(
        &self,
        ctx: &SyncContext<'_>,
        collection: &str,
    ) -> Result<Snapshot<Record<K>>> {
        let rows = self.bridge.block_on(
            ctx.cancel,
            db::fetch_remote(&self.remote, ctx.session_id, collection),
            remote_error,
        )?;
        Ok(Snapshot::decode(rows.iter().map(StoredRecord::decode::<K>)))
    }

    pub fn push_local<K: Serialize>(
        &self,
        ctx: &SyncContext<'_>,
        collection: &str,
        record: &Record<K>,
    ) -> Result<()> {
        let row = StoredRecord::encode(record)?;
        self.bridge.block_on(
            ctx.cancel,
            db::upsert_local(&self.local, ctx.session_id, collection, &row),
            local_error,
        )
    }

    pub fn push_remote<K: Serialize>(
        &self,
        ctx: &SyncContext<'_>,
        collection: &str,
        record: &Record<K>,
    ) -> Result<()> {
        let row = StoredRecord::encode(record)?;
        self.bridge.block_on(
            ctx.cancel,
            db::upsert_remote(&self.remote, ctx.session_id, collection, &row),
            remote_error,
        )
    }
}
