use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{BuildError, Result};

/// Cooperative cancellation for a running build.
///
/// Clones share one flag. The compiler checks it between module work units
/// (each loaded module, each generated module) and stops with
/// [`BuildError::Cancelled`]. The flag stays set until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}
