//! Sync endpoint routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_status, handle_sync, SessionStatus, SyncResponse};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/{session_id}", post(sync_handler))
        .route("/sync/{session_id}/status", get(status_handler))
}

/// POST /sync/{session_id} - Run a pass now.
async fn sync_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SyncResponse>> {
    let response = handle_sync(&state, &session_id).await?;
    Ok(Json(response))
}

/// GET /sync/{session_id}/status - Cursor of a session.
async fn status_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>> {
    let response = handle_status(&state, &session_id).await?;
    Ok(Json(response))
}
