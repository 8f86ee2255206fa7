//! Cooperative cancellation for long-running per-file operations.
//!
//! A [`CancelToken`] is a shared flag plus an optional deadline.  Streaming
//! loops poll [`CancelToken::check`] between super-chunks, so a cancelled
//! operation always stops on a block boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{EccError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag:     Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    /// Signal every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(EccError::Cancelled);
        }
        Ok(())
    }

    /// A child sharing this token's flag, with a deadline `timeout` from
    /// now (or the parent's deadline, whichever comes first).
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { flag: Arc::clone(&self.flag), deadline }
    }
}
