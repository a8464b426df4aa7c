//! Cooperative Cancellation
//!
//! Cancellation is advisory, never preemptive: cancelled work runs to
//! completion at the provider level and the consumer checks the token
//! before acting on a result.

use std::cell::Cell;
use std::rc::Rc;

/// Cooperative cancellation token.
///
/// Clones share the flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operation as superseded.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}
