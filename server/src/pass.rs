//! Running one sync pass for a session, from the HTTP trigger or the scheduler.
//!
//! At most one pass per session runs at a time. The cursor is loaded before
//! the pass and saved only after every entity type succeeded.

use crate::error::AppError;
use crate::AppState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tidesync_engine::{CancelToken, CursorStore, SyncCursor, SyncReport, Timestamp};

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit request, runs whether or not the cursor is due
    Manual,
    /// Scheduler tick, runs only when the cursor is due
    Scheduled,
}

/// Result of [`run_pass`] when nothing failed.
#[derive(Debug)]
pub enum PassOutcome {
    Completed {
        pass_id: String,
        report: SyncReport,
        cursor: SyncCursor,
    },
    NotDue {
        cursor: SyncCursor,
    },
}

/// Sessions with a pass currently running.
#[derive(Debug, Default)]
pub struct InFlight {
    sessions: DashMap<String, Instant>,
}

impl InFlight {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `session_id`, or `None` if a pass already holds it.
    pub fn try_begin(self: &Arc<Self>, session_id: &str) -> Option<InFlightGuard> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                Some(InFlightGuard {
                    registry: Arc::clone(self),
                    session_id: session_id.to_string(),
                })
            }
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }
}

/// Releases the session when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlight>,
    session_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some((_, started)) = self.registry.sessions.remove(&self.session_id) {
            tracing::debug!(
                session_id = %self.session_id,
                held_ms = started.elapsed().as_millis() as u64,
                "session released"
            );
        }
    }
}

/// Current wall clock in milliseconds since epoch.
pub fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Run one pass for `session_id` on a blocking thread.
pub async fn run_pass(
    state: &AppState,
    session_id: &str,
    trigger: Trigger,
) -> Result<PassOutcome, AppError> {
    let guard = state.in_flight.try_begin(session_id).ok_or_else(|| {
        AppError::Conflict(format!(
            "A sync pass is already running for session {}",
            session_id
        ))
    })?;

    let orchestrator = state.orchestrator.clone();
    let cursors = state.cursors.clone();
    let session = session_id.to_string();
    let pass_id = uuid::Uuid::new_v4().to_string();

    tokio::task::spawn_blocking(move || -> Result<PassOutcome, AppError> {
        // Held until the pass is over, even if the caller goes away.
        let _guard = guard;

        let mut cursor = cursors.load(&session)?;
        if trigger == Trigger::Scheduled && !cursor.is_due(now_millis()) {
            return Ok(PassOutcome::NotDue { cursor });
        }

        tracing::info!(session_id = %session, pass_id = %pass_id, ?trigger, "starting pass");
        let report = orchestrator.sync(&session, &CancelToken::new())?;

        cursor.record_success(now_millis());
        cursors.save(&session, &cursor)?;

        Ok(PassOutcome::Completed {
            pass_id,
            report,
            cursor,
        })
    })
    .await
    .map_err(|e| AppError::Internal(format!("sync task failed: {}", e)))?
}
