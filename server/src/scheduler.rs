//! Background scheduler.
//!
//! Wakes up periodically and runs a pass for every configured session whose
//! cursor is due. A failed pass leaves the cursor untouched, so the session is
//! still due on the next tick.

use crate::error::AppError;
use crate::pass::{run_pass, PassOutcome, Trigger};
use crate::AppState;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Longest sleep between two checks, whatever the sync interval.
const MAX_TICK: Duration = Duration::from_secs(30);

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub completed: usize,
    pub not_due: usize,
    pub busy: usize,
    pub failed: usize,
}

/// Start the scheduler, unless no session is configured.
pub fn spawn(state: AppState) -> Option<JoinHandle<()>> {
    if state.config.sync_sessions.is_empty() {
        tracing::info!("No SYNC_SESSIONS configured, scheduler disabled");
        return None;
    }

    let tick = state.config.sync_interval.min(MAX_TICK);
    tracing::info!(
        sessions = state.config.sync_sessions.len(),
        tick_ms = tick.as_millis() as u64,
        "Scheduler started"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let summary = run_due(&state).await;
            tracing::debug!(?summary, "Scheduler tick");
        }
    }))
}

/// Run a pass for every configured session that is due.
pub async fn run_due(state: &AppState) -> TickSummary {
    let passes = state.config.sync_sessions.iter().map(|session_id| async move {
        (
            session_id,
            run_pass(state, session_id, Trigger::Scheduled).await,
        )
    });

    let mut summary = TickSummary::default();
    for (session_id, result) in futures::future::join_all(passes).await {
        match result {
            Ok(PassOutcome::Completed { report, .. }) => {
                tracing::info!(
                    session_id = %session_id,
                    uploaded = report.uploaded(),
                    downloaded = report.downloaded(),
                    "Scheduled pass complete"
                );
                summary.completed += 1;
            }
            Ok(PassOutcome::NotDue { cursor }) => {
                tracing::trace!(
                    session_id = %session_id,
                    next_due_at = cursor.next_due_at(),
                    "Session not due"
                );
                summary.not_due += 1;
            }
            Err(AppError::Conflict(_)) => {
                tracing::debug!(session_id = %session_id, "Pass already running, skipping");
                summary.busy += 1;
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Scheduled pass failed: {}", e);
                summary.failed += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pass::now_millis;
    use tidesync_engine::{CursorStore, SyncCursor};

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_runs_only_due_sessions() {
        let mut config = Config::for_tests();
        config.sync_sessions = vec!["fresh".to_string(), "recent".to_string(), "busy".to_string()];
        let state = crate::test_support::state(config).await;

        let cursors = state.cursors.clone();
        tokio::task::spawn_blocking(move || {
            let mut cursor = SyncCursor::default();
            cursor.record_success(now_millis());
            cursors.save("recent", &cursor)
        })
        .await
        .unwrap()
        .unwrap();
        let _busy = state.in_flight.try_begin("busy").unwrap();

        let summary = run_due(&state).await;

        // "fresh" has never synced and the remote store is unreachable.
        assert_eq!(
            summary,
            TickSummary {
                completed: 0,
                not_due: 1,
                busy: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn disabled_without_sessions() {
        let state = crate::test_support::state(Config::for_tests()).await;
        assert!(spawn(state).is_none());
    }
}
