//! Authentication middleware.
//!
//! Triggering a pass requires `Authorization: Bearer <AUTH_SECRET>` when a
//! secret is configured. Without one the server runs open, for development.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Caller that presented a valid bearer token, or any caller when no secret
/// is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    Bearer,
    Anonymous,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authorize(auth_header, state.config.auth_secret.as_deref())
    }
}

fn authorize(header: Option<&str>, secret: Option<&str>) -> Result<AuthUser, AppError> {
    let Some(secret) = secret else {
        return Ok(AuthUser::Anonymous);
    };

    match header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if constant_time_eq(token.as_bytes(), secret.as_bytes()) => {
            Ok(AuthUser::Bearer)
        }
        Some(_) => {
            tracing::warn!("rejected bearer token");
            Err(AppError::Unauthorized)
        }
        None => Err(AppError::Unauthorized),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
