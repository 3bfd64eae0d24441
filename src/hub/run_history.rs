//! Rolling hourly window of task attempts.
//!
//! A sliding window over attempt timestamps (epoch milliseconds). The loop
//! prunes before every poll and refuses to poll while the window is full.

use std::collections::VecDeque;
use thiserror::Error;

/// Width of the window.
pub const WINDOW_MS: u64 = 3_600_000;

/// Rejected attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunLimitError {
    /// Hourly cap reached; the oldest attempt ages out after `retry_after_ms`.
    #[error("hourly run limit of {limit} reached; retry after {retry_after_ms}ms")]
    Exceeded { limit: usize, retry_after_ms: u64 },
}

/// Attempt timestamps from the last hour, oldest first.
#[derive(Debug, Clone)]
pub struct RunHistory {
    max_runs_per_hour: usize,
    window: VecDeque<u64>,
}

impl RunHistory {
    #[must_use]
    pub fn new(max_runs_per_hour: usize) -> Self {
        Self {
            max_runs_per_hour,
            window: VecDeque::with_capacity(max_runs_per_hour),
        }
    }

    /// Drop attempts older than one hour before `now_ms`.
    pub fn prune_at(&mut self, now_ms: u64) {
        let window_start = now_ms.saturating_sub(WINDOW_MS);
        while let Some(&first) = self.window.front() {
            if first < window_start {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// True when no further attempt is allowed at `now_ms`.
    pub fn is_at_cap_at(&mut self, now_ms: u64) -> bool {
        self.prune_at(now_ms);
        self.window.len() >= self.max_runs_per_hour
    }

    /// Record an attempt at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`RunLimitError::Exceeded`] and records nothing if the window
    /// is already full.
    pub fn record_at(&mut self, now_ms: u64) -> Result<(), RunLimitError> {
        self.prune_at(now_ms);
        if self.window.len() >= self.max_runs_per_hour {
            let retry_after_ms = self
                .window
                .front()
                .map(|&oldest| (oldest + WINDOW_MS).saturating_sub(now_ms))
                .unwrap_or(0);
            return Err(RunLimitError::Exceeded {
                limit: self.max_runs_per_hour,
                retry_after_ms,
            });
        }
        self.window.push_back(now_ms);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Attempts still allowed in the current window.
    pub fn remaining(&self) -> usize {
        self.max_runs_per_hour.saturating_sub(self.window.len())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn allows_up_to_cap() {
        let mut history = RunHistory::new(3);
        for i in 0..3 {
            history.record_at(T0 + i).unwrap();
        }
        assert!(history.is_at_cap_at(T0 + 10));
        assert_eq!(history.remaining(), 0);
    }

    #[test]
    fn never_exceeds_cap() {
        let mut history = RunHistory::new(20);
        for i in 0..50 {
            let _ = history.record_at(T0 + i * 1_000);
            assert!(history.len() <= 20);
        }
        let err = history.record_at(T0 + 60_000).unwrap_err();
        let RunLimitError::Exceeded {
            limit,
            retry_after_ms,
        } = err;
        assert_eq!(limit, 20);
        assert_eq!(retry_after_ms, WINDOW_MS - 60_000);
    }

    #[test]
    fn old_entries_age_out() {
        let mut history = RunHistory::new(2);
        history.record_at(T0).unwrap();
        history.record_at(T0 + 1_000).unwrap();
        assert!(history.is_at_cap_at(T0 + WINDOW_MS));

        // First entry is now older than the window.
        assert!(!history.is_at_cap_at(T0 + WINDOW_MS + 1));
        assert_eq!(history.len(), 1);
        history.record_at(T0 + WINDOW_MS + 1).unwrap();
    }

    #[test]
    fn prune_on_empty_history() {
        let mut history = RunHistory::new(20);
        history.prune_at(0);
        assert!(history.is_empty());
        assert!(!history.is_at_cap_at(0));
    }
}
