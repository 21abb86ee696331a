//! Cooperative cancellation flag shared between the caller and a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::InstallError;

/// One-shot cancellation signal.
///
/// Cloning shares the flag. Setting is idempotent and monotonic: once
/// requested, a signal never reverts to unset.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; returns true only for the call that set it
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint helper for stage loops
    pub fn check(&self) -> Result<(), InstallError> {
        if self.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }
}
