//! Cooperative cancellation.
//!
//! Long operations poll a [`CancelFlag`] between discrete steps (between
//! resources while building a snapshot, between scans during retention). A
//! transaction already in flight always runs to commit or rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    ///
    /// # Errors
    ///
    /// `Cancelled` tagged with `op`.
    pub fn check(&self, op: &str) -> crate::errors::Result<()> {
        if self.is_cancelled() {
            return Err(crate::errors::cancelled(op));
        }
        Ok(())
    }
}
