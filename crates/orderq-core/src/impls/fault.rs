use std::sync::atomic::{AtomicU32, Ordering};

/// Counts down armed failures: `arm(3)` makes the next three `trip()` calls
/// return true.
#[derive(Debug, Default)]
pub struct FaultInjector {
    remaining: AtomicU32,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, failures: u32) {
        self.remaining.store(failures, Ordering::SeqCst);
    }

    pub fn trip(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}
