//! Cooperative cancellation for sync passes.
//!
//! A [`CancelToken`] is threaded through every store call. Store adapters and
//! the engine call [`CancelToken::checkpoint`] before doing work; the token
//! trips when it is cancelled explicitly, when its deadline passes, or when
//! any of its ancestors trips.

use crate::error::{Result, SyncError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn state(&self, now: Instant) -> Option<SyncError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(SyncError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            return Some(SyncError::TimedOut);
        }
        self.parent.as_ref().and_then(|parent| parent.state(now))
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.earliest_deadline());
        match (self.deadline, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag. Children created with [`CancelToken::child`]
/// can be cancelled on their own without affecting the parent.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that only trips when cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// A token that also trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Instant::now().checked_add(timeout),
                parent: None,
            }),
        }
    }

    /// A child token: trips with this one, but cancelling the child leaves
    /// the parent untouched.
    pub fn child(&self) -> Self {
        self.child_with_deadline(None)
    }

    /// A child token with its own additional timeout.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(Instant::now().checked_add(timeout))
    }

    fn child_with_deadline(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state(Instant::now()).is_some()
    }

    /// `Ok(())` while the token is live, the tripping reason otherwise.
    pub fn checkpoint(&self) -> Result<()> {
        match self.inner.state(Instant::now()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Time left before the nearest deadline, `None` when there is none.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .earliest_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.checkpoint(), Ok(()));
        assert_eq!(token.remaining(), None);
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert_eq!(token.checkpoint(), Err(SyncError::Cancelled));
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.checkpoint(), Err(SyncError::Cancelled));
    }

    #[test]
    fn elapsed_deadline_times_out() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert_eq!(token.checkpoint(), Err(SyncError::TimedOut));
        assert_eq!(token.remaining(), Some(Duration::ZERO));

        let child = token.child();
        assert_eq!(child.checkpoint(), Err(SyncError::TimedOut));
    }

    #[test]
    fn remaining_uses_nearest_deadline() {
        let parent = CancelToken::with_timeout(Duration::from_secs(3600));
        let child = parent.child_with_timeout(Duration::from_secs(1));
        let remaining = child.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(1));
    }
}
