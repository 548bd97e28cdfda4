// Scoped reentrancy guard for refresh.
//
// A refresh holds the guard from the moment it starts until the reply to the
// fetch it issued has been handled. The guard travels with the request, so it
// is released on every exit path: handled reply, transport error, stale
// discard, or the request being aborted by a newer one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RefreshLatch {
    held: Arc<AtomicBool>,
}

impl RefreshLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` while another refresh holds it.
    pub fn try_acquire(&self) -> Option<RefreshGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the latch on drop.
#[derive(Debug)]
pub struct RefreshGuard {
    held: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
