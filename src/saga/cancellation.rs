//! Cancellation tokens for long-running saga operations
//!
//! The spend-and-confirm poller has no timeout of its own: it polls until
//! the backend catches up or until the owner of the handle cancels it
//! (typically on UI teardown). A cancelled operation discards in-flight
//! results and never calls back into caller state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Common interface for cooperative cancellation
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    /// Check if cancellation has been requested
    fn is_cancelled(&self) -> bool;

    /// Request cancellation of the operation
    fn cancel(&self);
}

/// Atomic-boolean cancellation token
///
/// Works in any environment without depending on a specific async runtime.
#[derive(Debug, Clone, Default)]
pub struct AtomicCancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `(token, handle)` pair where the handle cancels the token
    /// from a different context
    pub fn create_pair() -> (Self, CancellationHandle) {
        let token = Self::new();
        let handle = CancellationHandle {
            cancelled: token.cancelled.clone(),
        };
        (token, handle)
    }
}

impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Handle for cancelling an operation owned elsewhere
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A token that never cancels; the default when no teardown exists
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn cancel(&self) {}
}

/// A token that is always cancelled; for testing abort paths
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCancel;

impl CancellationToken for AlwaysCancel {
    fn is_cancelled(&self) -> bool {
        true
    }

    fn cancel(&self) {}
}
