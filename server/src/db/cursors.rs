//! Database operations for the `sync_cursors` table.

use crate::db::LocalPool;
use crate::stores::{local_error, Bridge};
use sqlx::Row;
use tidesync_engine::error::Result;
use tidesync_engine::{CancelToken, CursorStore, SyncCursor, SyncError};

/// Load the cursor of a session, if one was ever saved.
pub async fn load_cursor(
    pool: &LocalPool,
    session_id: &str,
) -> std::result::Result<Option<(i64, i64)>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT last_sync_at, sync_interval_ms
        FROM sync_cursors
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some((
            row.try_get("last_sync_at")?,
            row.try_get("sync_interval_ms")?,
        ))),
        None => Ok(None),
    }
}

/// Insert or replace the cursor of a session.
pub async fn save_cursor(
    pool: &LocalPool,
    session_id: &str,
    last_sync_at: i64,
    sync_interval_ms: i64,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_cursors (session_id, last_sync_at, sync_interval_ms)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (session_id) DO UPDATE SET
            last_sync_at = excluded.last_sync_at,
            sync_interval_ms = excluded.sync_interval_ms
        "#,
    )
    .bind(session_id)
    .bind(last_sync_at)
    .bind(sync_interval_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// Cursors persisted in the local database.
///
/// The configured interval always applies: a session without a saved cursor
/// starts from a fresh one, and a restored cursor picks up the current
/// interval in place of the one it was saved with.
#[derive(Debug, Clone)]
pub struct SqliteCursorStore {
    pool: LocalPool,
    bridge: Bridge,
    interval_ms: u64,
}

impl SqliteCursorStore {
    pub fn new(pool: LocalPool, bridge: Bridge, interval_ms: u64) -> Self {
        Self {
            pool,
            bridge,
            interval_ms,
        }
    }
}

impl CursorStore for SqliteCursorStore {
    fn load(&self, session_id: &str) -> Result<SyncCursor> {
        let stored = self.bridge.block_on(
            &CancelToken::new(),
            load_cursor(&self.pool, session_id),
            local_error,
        )?;

        match stored {
            Some((last_sync_at, interval_ms)) => {
                let last_sync_at = u64::try_from(last_sync_at).map_err(|_| {
                    SyncError::persistence(format!("negative lastSyncAt {}", last_sync_at))
                })?;
                let interval_ms = u64::try_from(interval_ms).map_err(|_| {
                    SyncError::persistence(format!("negative syncIntervalMs {}", interval_ms))
                })?;
                let mut cursor = SyncCursor::restore(last_sync_at, interval_ms);
                if interval_ms != self.interval_ms {
                    tracing::debug!(
                        session_id,
                        saved_ms = interval_ms,
                        configured_ms = self.interval_ms,
                        "sync interval changed since last save"
                    );
                    cursor.set_sync_interval_ms(self.interval_ms);
                }
                Ok(cursor)
            }
            None => Ok(SyncCursor::new(self.interval_ms)),
        }
    }

    fn save(&self, session_id: &str, cursor: &SyncCursor) -> Result<()> {
        let last_sync_at = i64::try_from(cursor.last_sync_at())
            .map_err(|_| SyncError::persistence("lastSyncAt out of range"))?;
        let interval_ms = i64::try_from(cursor.sync_interval_ms())
            .map_err(|_| SyncError::persistence("syncIntervalMs out of range"))?;

        self.bridge.block_on(
            &CancelToken::new(),
            save_cursor(&self.pool, session_id, last_sync_at, interval_ms),
            local_error,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn local_pool() -> LocalPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_local_migrations(&pool).await.unwrap();
        pool
    }

    async fn cursor_store() -> SqliteCursorStore {
        SqliteCursorStore::new(local_pool().await, Bridge::current(), 60_000)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_session_gets_a_fresh_cursor() {
        let store = cursor_store().await;
        let cursor = tokio::task::spawn_blocking(move || store.load("user-1"))
            .await
            .unwrap()
            .unwrap();

        assert!(!cursor.has_synced());
        assert_eq!(cursor.sync_interval_ms(), 60_000);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saved_cursor_is_restored() {
        let store = cursor_store().await;
        let (first, other) = tokio::task::spawn_blocking(move || {
            let mut cursor = SyncCursor::new(60_000);
            cursor.record_success(1_706_745_600_000);
            store.save("user-1", &cursor)?;
            cursor.record_success(1_706_745_900_000);
            store.save("user-1", &cursor)?;
            Ok::<_, SyncError>((store.load("user-1")?, store.load("user-2")?))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(first, SyncCursor::restore(1_706_745_900_000, 60_000));
        assert!(!other.has_synced());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restored_cursor_uses_configured_interval() {
        let pool = local_pool().await;
        let before = SqliteCursorStore::new(pool.clone(), Bridge::current(), 300_000);
        let after = SqliteCursorStore::new(pool.clone(), Bridge::current(), 60_000);

        let cursor = tokio::task::spawn_blocking(move || {
            let mut cursor = before.load("user-1")?;
            cursor.record_success(1_000_000);
            before.save("user-1", &cursor)?;
            let reloaded = after.load("user-1")?;
            after.save("user-1", &reloaded)?;
            Ok::<_, SyncError>(reloaded)
        })
        .await
        .unwrap()
        .unwrap();
        let row = load_cursor(&pool, "user-1").await.unwrap();

        assert_eq!(cursor.last_sync_at(), 1_000_000);
        assert_eq!(cursor.sync_interval_ms(), 60_000);
        assert!(cursor.is_due(1_060_000));
        assert!(!cursor.is_due(1_059_999));
        assert_eq!(row, Some((1_000_000, 60_000)));
    }
}
