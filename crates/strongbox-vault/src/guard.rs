//! Single-flight guard for the backup-and-upload sequence.
//!
//! A second request while a backup is running is rejected immediately
//! rather than queued, so two archives are never assembled at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Compare-and-swap guard owned by the backup service.
#[derive(Debug, Default, Clone)]
pub struct BackupGuard {
    running: Arc<AtomicBool>,
}

impl BackupGuard {
    /// A guard in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard if it is idle.
    ///
    /// Returns `None` when another permit is outstanding.
    #[must_use]
    pub fn try_acquire(&self) -> Option<BackupPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BackupPermit {
                running: Arc::clone(&self.running),
            })
    }

    /// Whether a permit is outstanding.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that the holder runs the only backup. Releases on drop.
#[derive(Debug)]
pub struct BackupPermit {
    running: Arc<AtomicBool>,
}

impl BackupPermit {
    /// Release explicitly (same as dropping the permit).
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BackupPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
