//! # Fibonacci Backoff
//!
//! Progressive backoff for failed reconciliations, growing more slowly
//! than exponential backoff so a flapping provider does not push retry
//! intervals out too aggressively.
//!
//! Sequence with the default 1 s minimum: 1, 1, 2, 3, 5, 8, ... capped
//! at the configured maximum. A successful apply resets the sequence.

use std::time::Duration;

/// Fibonacci backoff calculator.
///
/// Each backoff is the sum of the previous two, capped at `max_secs`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value in seconds (for reset)
    min_secs: u64,
    /// Previous backoff value in seconds
    prev_secs: u64,
    /// Current backoff value in seconds
    current_secs: u64,
    /// Maximum backoff value in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff with the given minimum and cap, both in seconds.
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence.
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);
        result
    }

    /// Get the next backoff as a [`Duration`] and advance the sequence.
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Reset to the initial state after a successful apply.
    #[allow(dead_code)] // Utility method, may be useful in the future
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_fibonacci_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 600);

        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);
        assert_eq!(backoff.next_backoff_seconds(), 3);
        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 8);
        assert_eq!(backoff.next_backoff_seconds(), 13);
    }

    #[test]
    fn caps_at_maximum() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        for _ in 0..6 {
            let _ = backoff.next_backoff_seconds();
        }
        // 13 would follow 8; capped at 10 and stays there
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 600);

        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);

        backoff.reset();

        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);
    }
}
