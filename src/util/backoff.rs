//! Exponential backoff for idle worker loops.

use std::cell::Cell;
use std::hint::spin_loop;
use std::thread;

/// Spin, then yield, then report completion so the caller can park.
#[derive(Debug)]
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;

    pub fn new() -> Self {
        Self { step: Cell::new(0) }
    }

    pub fn reset(&self) {
        self.step.set(0);
    }

    /// Perform one step of backoff
    pub fn snooze(&self) {
        let step = self.step.get();

        if step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << step) {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }

        if step <= Self::YIELD_LIMIT {
            self.step.set(step + 1);
        }
    }

    /// Past the yield phase; the caller should block instead.
    pub fn is_completed(&self) -> bool {
        self.step.get() > Self::YIELD_LIMIT
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let backoff = Backoff::new();
        assert!(!backoff.is_completed());

        for _ in 0..20 {
            backoff.snooze();
        }

        assert!(backoff.is_completed());
    }

    #[test]
    fn test_backoff_reset() {
        let backoff = Backoff::new();

        for _ in 0..20 {
            backoff.snooze();
        }
        assert!(backoff.is_completed());

        backoff.reset();
        assert!(!backoff.is_completed());
    }
}
