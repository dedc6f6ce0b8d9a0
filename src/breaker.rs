// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token.
///
/// Clones share the same flag: a [Breaker] handed to a route calculation
/// may be cancelled from any other thread. Search and post-processing loops
/// poll it once per processed node.
#[derive(Debug, Clone, Default)]
pub struct Breaker(Arc<AtomicBool>);

impl Breaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clears a previous cancellation request, so that the token may be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = Breaker::new();
        let b = a.clone();
        assert!(!b.is_cancelled());

        let handle = std::thread::spawn(move || a.cancel());
        handle.join().unwrap();
        assert!(b.is_cancelled());

        b.reset();
        assert!(!b.is_cancelled());
    }
}
