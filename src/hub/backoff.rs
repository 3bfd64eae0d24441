//! Per-state polling backoff.
//!
//! | State | Base delay | Cap |
//! |-------|------------|-----|
//! | `Idle` | 5 s × 3^idle_attempts | 5 min |
//! | `WaitingApprover` | 90 s (±30 s jitter) | 2 min |
//! | `ErrorAuth` | 5 min flat | 5 min |
//! | `ErrorQuota` | 2 min flat | 2 min |
//! | `ErrorNetwork` | 15 s × 2^error_attempts | 5 min |
//! | `ErrorUnknown` | 30 s × 4^error_attempts | 10 min |
//!
//! Jitter (±2 s unless noted) is added to the uncapped base and the sum is
//! clamped to `[1 s, cap]`.

use crate::hub::state::OperatingState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Smallest delay ever returned, in milliseconds.
pub const MIN_DELAY_MS: u64 = 1_000;

const DEFAULT_JITTER_MS: i64 = 2_000;
const APPROVER_JITTER_MS: i64 = 30_000;

/// Attempt counters carried between delay computations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffCounters {
    /// Consecutive idle polls.
    pub idle_attempts: u32,
    /// Consecutive network/unknown failures (shared counter).
    pub error_attempts: u32,
}

/// Upper bound for `state`, in milliseconds.
pub fn cap_ms(state: OperatingState) -> u64 {
    match state {
        OperatingState::Idle => 300_000,
        OperatingState::WaitingApprover => 120_000,
        OperatingState::ErrorAuth => 300_000,
        OperatingState::ErrorQuota => 120_000,
        OperatingState::ErrorNetwork => 300_000,
        OperatingState::ErrorUnknown => 600_000,
    }
}

/// Jitter half-width for `state`, in milliseconds.
pub fn jitter_bound_ms(state: OperatingState) -> i64 {
    match state {
        OperatingState::WaitingApprover => APPROVER_JITTER_MS,
        _ => DEFAULT_JITTER_MS,
    }
}

/// Compute the delay for `state` given `jitter_ms` (already drawn from
/// `[-jitter_bound_ms, +jitter_bound_ms]`). Returns the delay in
/// milliseconds and the updated counters.
pub fn compute_delay(
    state: OperatingState,
    counters: BackoffCounters,
    jitter_ms: i64,
) -> (u64, BackoffCounters) {
    let mut next = counters;
    let base: u64 = match state {
        OperatingState::Idle => {
            next.idle_attempts = counters.idle_attempts.saturating_add(1);
            exponential(5_000, 3, counters.idle_attempts)
        }
        OperatingState::WaitingApprover => 90_000,
        OperatingState::ErrorAuth => 300_000,
        OperatingState::ErrorQuota => 120_000,
        OperatingState::ErrorNetwork => {
            next.error_attempts = counters.error_attempts.saturating_add(1);
            exponential(15_000, 2, counters.error_attempts)
        }
        OperatingState::ErrorUnknown => {
            next.error_attempts = counters.error_attempts.saturating_add(1);
            exponential(30_000, 4, counters.error_attempts)
        }
    };

    let jittered = i128::from(base) + i128::from(jitter_ms);
    let cap = cap_ms(state);
    let delay = jittered.clamp(i128::from(MIN_DELAY_MS), i128::from(cap));
    // Clamped into u64 range above.
    (u64::try_from(delay).unwrap_or(cap), next)
}

fn exponential(base: u64, factor: u64, attempts: u32) -> u64 {
    base.saturating_mul(factor.saturating_pow(attempts))
}

/// Stateful backoff: owns the attempt counters and the jitter source.
#[derive(Debug)]
pub struct BackoffPolicy {
    counters: BackoffCounters,
    rng: StdRng,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffPolicy {
    /// Policy with entropy-seeded jitter.
    pub fn new() -> Self {
        Self {
            counters: BackoffCounters::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Policy with reproducible jitter.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            counters: BackoffCounters::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next delay for `state`. Advances the relevant counter.
    pub fn delay(&mut self, state: OperatingState) -> Duration {
        let bound = jitter_bound_ms(state);
        let jitter = self.rng.gen_range(-bound..=bound);
        let (ms, counters) = compute_delay(state, self.counters, jitter);
        self.counters = counters;
        Duration::from_millis(ms)
    }

    /// Zero every counter. Called after a task completes.
    pub fn reset(&mut self) {
        self.counters = BackoffCounters::default();
    }

    pub fn counters(&self) -> BackoffCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const ALL: [OperatingState; 6] = [
        OperatingState::Idle,
        OperatingState::WaitingApprover,
        OperatingState::ErrorAuth,
        OperatingState::ErrorQuota,
        OperatingState::ErrorNetwork,
        OperatingState::ErrorUnknown,
    ];

    #[test]
    fn idle_sequence_without_jitter() {
        let mut counters = BackoffCounters::default();
        let mut seen = Vec::new();
        for _ in 0..6 {
            let (ms, next) = compute_delay(OperatingState::Idle, counters, 0);
            seen.push(ms);
            counters = next;
        }
        assert_eq!(seen, vec![5_000, 15_000, 45_000, 135_000, 300_000, 300_000]);
        assert_eq!(counters.error_attempts, 0);
    }

    #[test]
    fn network_and_unknown_share_the_error_counter() {
        let (a, c) = compute_delay(OperatingState::ErrorNetwork, BackoffCounters::default(), 0);
        let (b, c) = compute_delay(OperatingState::ErrorNetwork, c, 0);
        let (u, c) = compute_delay(OperatingState::ErrorUnknown, c, 0);
        assert_eq!((a, b), (15_000, 30_000));
        assert_eq!(u, 480_000);
        assert_eq!(c.error_attempts, 3);
        assert_eq!(c.idle_attempts, 0);
    }

    #[test]
    fn unknown_caps_at_ten_minutes() {
        let counters = BackoffCounters {
            idle_attempts: 0,
            error_attempts: 5,
        };
        let (ms, _) = compute_delay(OperatingState::ErrorUnknown, counters, 2_000);
        assert_eq!(ms, 600_000);
    }

    #[test]
    fn flat_states_never_touch_counters() {
        let counters = BackoffCounters {
            idle_attempts: 2,
            error_attempts: 3,
        };
        for state in [
            OperatingState::WaitingApprover,
            OperatingState::ErrorAuth,
            OperatingState::ErrorQuota,
        ] {
            let (_, next) = compute_delay(state, counters, 0);
            assert_eq!(next, counters);
        }
    }

    #[test]
    fn huge_counters_do_not_overflow() {
        let counters = BackoffCounters {
            idle_attempts: u32::MAX,
            error_attempts: u32::MAX,
        };
        assert_eq!(compute_delay(OperatingState::Idle, counters, -2_000).0, 300_000);
        assert_eq!(
            compute_delay(OperatingState::ErrorNetwork, counters, 0).0,
            300_000
        );
    }

    #[test]
    fn every_delay_within_floor_and_cap() {
        let mut policy = BackoffPolicy::with_seed(7);
        for round in 0..200 {
            let state = ALL[round % ALL.len()];
            let ms = policy.delay(state).as_millis() as u64;
            assert!(ms >= MIN_DELAY_MS, "{state} gave {ms}");
            assert!(ms <= cap_ms(state), "{state} gave {ms}");
        }
    }

    #[test]
    fn idle_is_non_decreasing_then_holds_at_cap() {
        let mut policy = BackoffPolicy::with_seed(42);
        let mut previous = 0;
        for _ in 0..12 {
            let ms = policy.delay(OperatingState::Idle).as_millis() as u64;
            assert!(ms >= previous);
            previous = ms;
        }
        assert_eq!(previous, 300_000);
    }

    #[test]
    fn reset_restarts_idle_sequence() {
        let mut policy = BackoffPolicy::with_seed(1);
        for _ in 0..4 {
            policy.delay(OperatingState::Idle);
        }
        policy.delay(OperatingState::ErrorNetwork);
        policy.reset();
        assert_eq!(policy.counters(), BackoffCounters::default());

        let ms = policy.delay(OperatingState::Idle).as_millis() as u64;
        assert!((3_000..=7_000).contains(&ms));
    }

    #[test]
    fn approver_wait_stays_in_its_window() {
        let mut policy = BackoffPolicy::with_seed(3);
        for _ in 0..100 {
            let ms = policy.delay(OperatingState::WaitingApprover).as_millis() as u64;
            assert!((60_000..=120_000).contains(&ms));
        }
    }

    #[test]
    fn quota_delay_near_two_minutes() {
        let mut policy = BackoffPolicy::with_seed(9);
        for _ in 0..50 {
            let ms = policy.delay(OperatingState::ErrorQuota).as_millis() as u64;
            assert!((118_000..=120_000).contains(&ms));
        }
    }
}
