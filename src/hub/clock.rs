//! Time source for the task loop.
//!
//! The loop never calls the system clock or `tokio::time::sleep` directly
//! for its own cadence, so tests can record requested sleeps and move time
//! forward instantly.

use async_trait::async_trait;
use std::time::Duration;

/// Wall-clock time plus sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_sleep_uses_tokio_time() {
        let begun = tokio::time::Instant::now();
        SystemClock.sleep(Duration::from_secs(90)).await;
        assert!(begun.elapsed() >= Duration::from_secs(90));
    }
}
