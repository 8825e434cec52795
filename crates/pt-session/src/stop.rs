//! One-shot stop handles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Requests teardown of one session.
///
/// Clones share state. Only the first [`signal`](StopHandle::signal) has an
/// effect; repeated signals are no-ops.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request teardown. Returns `true` only for the call that fired it.
    pub fn signal(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether teardown was requested
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once teardown is requested
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Token observed by the tunnel's forward loop
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether both handles belong to the same session
    pub fn same_as(&self, other: &StopHandle) -> bool {
        Arc::ptr_eq(&self.fired, &other.fired)
    }
}
