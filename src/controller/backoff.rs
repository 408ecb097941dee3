//! # Fibonacci Backoff
//!
//! Progressive backoff for failed reconciliations. Fibonacci grows more
//! slowly than exponential backoff, which suits operations that routinely
//! need a few retries (Vault sealed, auth engine not yet configured)
//! without hammering the backend.
//!
//! The sequence is computed in minutes and capped:
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m (max).

use std::time::Duration;

/// Fibonacci backoff calculator. Each value is the sum of the previous
/// two, clamped to the configured maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Next backoff in the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_minutes.min(self.max_minutes);
        let next = (self.prev_minutes + self.current_minutes).min(self.max_minutes);
        self.prev_minutes = self.current_minutes.min(self.max_minutes);
        self.current_minutes = next;
        Duration::from_secs(result * 60)
    }

    /// Reset to the beginning of the sequence after a success.
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_fibonacci_in_minutes() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let seq: Vec<u64> = (0..7).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(seq, vec![60, 60, 120, 180, 300, 480, 600]);
    }

    #[test]
    fn caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        for _ in 0..20 {
            let _ = backoff.next_backoff();
        }
        assert_eq!(backoff.next_backoff().as_secs(), 600);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        for _ in 0..5 {
            let _ = backoff.next_backoff();
        }
        backoff.reset();
        assert_eq!(backoff.next_backoff().as_secs(), 60);
    }
}
