//! Cooperative cancellation shared between the presentation thread and
//! background work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancellation flag.
///
/// Clones share the same flag, so cancelling any clone cancels them all.
/// Background work is expected to poll [`CancelToken::is_cancelled`] at I/O
/// boundaries and between iterations of bulk work.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
