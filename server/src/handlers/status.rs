//! Status handler - reports the cursor of a session.

use crate::error::{AppError, Result};
use crate::handlers::validate_session_id;
use crate::pass::now_millis;
use crate::AppState;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tidesync_engine::{CursorStore, SyncCursor, Timestamp};

/// Cursor of one session as seen by clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    /// Milliseconds since epoch, 0 before the first successful pass
    pub last_sync_at: Timestamp,
    /// RFC 3339 rendering of `last_sync_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at_iso: Option<String>,
    pub sync_interval_ms: u64,
    pub next_due_at: Timestamp,
    pub due: bool,
    pub in_flight: bool,
}

impl SessionStatus {
    pub fn new(session_id: &str, cursor: &SyncCursor, now: Timestamp, in_flight: bool) -> Self {
        let last_sync_at_iso = if cursor.has_synced() {
            i64::try_from(cursor.last_sync_at())
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        } else {
            None
        };

        Self {
            session_id: session_id.to_string(),
            last_sync_at: cursor.last_sync_at(),
            last_sync_at_iso,
            sync_interval_ms: cursor.sync_interval_ms(),
            next_due_at: cursor.next_due_at(),
            due: cursor.is_due(now),
            in_flight,
        }
    }
}

/// Load the cursor of a session.
pub async fn handle_status(state: &AppState, session_id: &str) -> Result<SessionStatus> {
    validate_session_id(session_id)?;

    let cursors = state.cursors.clone();
    let session = session_id.to_string();
    let cursor = tokio::task::spawn_blocking(move || cursors.load(&session))
        .await
        .map_err(|e| AppError::Internal(format!("status task failed: {}", e)))??;

    Ok(SessionStatus::new(
        session_id,
        &cursor,
        now_millis(),
        state.in_flight.contains(session_id),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_synced() {
        let status = SessionStatus::new("user-1", &SyncCursor::default(), 1_000, false);
        assert_eq!(status.last_sync_at, 0);
        assert!(status.last_sync_at_iso.is_none());
        assert_eq!(status.next_due_at, 0);
        assert!(status.due);
    }

    #[test]
    fn synced_recently() {
        let cursor = SyncCursor::restore(1_706_745_600_000, 300_000);
        let status = SessionStatus::new("user-1", &cursor, 1_706_745_660_000, true);

        assert_eq!(
            status.last_sync_at_iso.as_deref(),
            Some("2024-02-01T00:00:00.000Z")
        );
        assert_eq!(status.next_due_at, 1_706_745_900_000);
        assert!(!status.due);
        assert!(status.in_flight);
    }

    #[test]
    fn serialization_format() {
        let status = SessionStatus::new("user-1", &SyncCursor::restore(0, 300_000), 0, false);
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["sessionId"], "user-1");
        assert_eq!(json["syncIntervalMs"], 300_000);
        assert_eq!(json["inFlight"], false);
        assert!(json.get("lastSyncAtIso").is_none());
    }
}
