//! Request handlers for sync passes.

mod status;
mod sync;

pub use status::*;
pub use sync::*;

use crate::error::{AppError, Result};

/// Longest accepted session id.
const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids are user ids: short, printable, no path separators.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "Session id must be 1 to {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    let valid = session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        return Err(AppError::BadRequest(format!(
            "Invalid session id: {}",
            session_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids() {
        assert!(validate_session_id("user-1").is_ok());
        assert!(validate_session_id("a.b_c@example.com").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("users/1").is_err());
        assert!(validate_session_id(&"x".repeat(129)).is_err());
    }
}
