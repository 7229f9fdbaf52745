//! Process-wide exit request flag (§4.14).
//!
//! Modeled as an explicit, clonable handle rather than a true global so every
//! subsystem that can request a shutdown (the credits state, the script `quit`
//! binding, the desktop presenter) shares one flag by reference instead of reaching
//! for a `static`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply clonable, thread-safe request-to-exit flag.
#[derive(Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        QuitFlag(Arc::new(AtomicBool::new(false)))
    }

    /// Ask the host loop to exit at its next opportunity.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an exit has been requested.
    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previously requested exit, e.g. after a dev-mode reload.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flag_is_not_requested() {
        assert!(!QuitFlag::new().requested());
    }

    #[test]
    fn request_is_visible_through_a_clone() {
        let flag = QuitFlag::new();
        let clone = flag.clone();
        clone.request();
        assert!(flag.requested());
    }

    #[test]
    fn reset_clears_a_pending_request() {
        let flag = QuitFlag::new();
        flag.request();
        flag.reset();
        assert!(!flag.requested());
    }
}
