//! Sync handler - runs one pass on request.

use crate::error::{AppError, Result};
use crate::handlers::{validate_session_id, SessionStatus};
use crate::pass::{now_millis, run_pass, PassOutcome, Trigger};
use crate::AppState;
use serde::Serialize;
use tidesync_engine::SyncReport;

/// Response for a completed pass.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub pass_id: String,
    pub report: SyncReport,
    /// Cursor after the pass
    pub cursor: SessionStatus,
}

/// Run a pass for `session_id` now, regardless of the schedule.
pub async fn handle_sync(state: &AppState, session_id: &str) -> Result<SyncResponse> {
    validate_session_id(session_id)?;

    match run_pass(state, session_id, Trigger::Manual).await? {
        PassOutcome::Completed {
            pass_id,
            report,
            cursor,
        } => Ok(SyncResponse {
            pass_id,
            report,
            cursor: SessionStatus::new(session_id, &cursor, now_millis(), false),
        }),
        PassOutcome::NotDue { .. } => Err(AppError::Internal(
            "manual pass was skipped as not due".to_string(),
        )),
    }
}
