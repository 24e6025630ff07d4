//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tidesync_engine::{SyncError, SyncFailure};

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Sync(#[from] SyncFailure),

    /// Cursor bookkeeping failed outside of any entity type
    #[error("Cursor error: {0}")]
    Cursor(#[from] SyncError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Sync(failure) => match failure.cause {
                SyncError::Transport(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Cursor(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Database error".to_string(), None)
            }
            AppError::Sync(failure) => {
                let details = match failure.failed_pushes() {
                    0 | 1 => failure.cause.to_string(),
                    n => format!("{} ({} pushes failed)", failure.cause, n),
                };
                (format!("Sync failed on {}", failure.entity_type), Some(details))
            }
            AppError::Cursor(e) => {
                tracing::error!("Cursor error: {}", e);
                ("Cursor error".to_string(), Some(e.to_string()))
            }
            AppError::BadRequest(msg) => (msg.clone(), None),
            AppError::Conflict(msg) => (msg.clone(), None),
            AppError::Unauthorized => ("Unauthorized".to_string(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), Some(msg.clone()))
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(cause: SyncError) -> AppError {
        AppError::Sync(SyncFailure {
            session_id: "user-1".to_string(),
            entity_type: "workout_sets".to_string(),
            cause,
            report: tidesync_engine::EntityReport::new("workout_sets"),
        })
    }

    #[test]
    fn transport_failures_are_bad_gateway() {
        assert_eq!(
            failure(SyncError::transport("connection refused")).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn other_failures_are_internal() {
        assert_eq!(
            failure(SyncError::persistence("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            failure(SyncError::TimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn failed_push_count_in_details() {
        let mut report = tidesync_engine::EntityReport::new("workout_sets");
        report.failed_pushes = 3;
        let error = AppError::Sync(SyncFailure {
            session_id: "user-1".to_string(),
            entity_type: "workout_sets".to_string(),
            cause: SyncError::transport("connection reset"),
            report,
        });

        let response = error.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Sync failed on workout_sets");
        assert_eq!(
            json["details"],
            "remote store unreachable: connection reset (3 pushes failed)"
        );
    }

    #[test]
    fn client_errors() {
        assert_eq!(
            AppError::Conflict("busy".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
