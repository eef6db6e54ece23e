use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Non-blocking exclusion gate around model training
///
/// Contended callers are turned away instead of queued. The flag is released when the
/// [`TrainingPermit`] is dropped, so every exit path of the guarded section releases it.
/// The permit owns a handle to the guard and can be moved into a spawned task, which keeps
/// the guard held for as long as that task runs.
#[derive(Debug, Default)]
pub struct TrainingGuard {
    held: AtomicBool,
}

impl TrainingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the guard without waiting
    pub fn try_acquire(self: &Arc<Self>) -> Option<TrainingPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                debug!("Training guard acquired");
                TrainingPermit {
                    guard: Arc::clone(self),
                }
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
        debug!("Training guard released");
    }
}

/// Proof of holding the [`TrainingGuard`]; releases it on drop
#[derive(Debug)]
pub struct TrainingPermit {
    guard: Arc<TrainingGuard>,
}

impl Drop for TrainingPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}
