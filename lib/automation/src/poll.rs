//! Bounded polling.
//!
//! Every "wait until the page shows X" in the workflows goes through
//! [`poll_until`]: probe, sleep a fixed interval, give up after a fixed
//! duration.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Interval and deadline for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between probes.
    pub interval: Duration,
    /// Maximum total wait.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Shorthand for millisecond interval and timeout.
    #[must_use]
    pub const fn millis(interval: u64, timeout: u64) -> Self {
        Self::new(
            Duration::from_millis(interval),
            Duration::from_millis(timeout),
        )
    }
}

/// Probes until it yields a value or the policy's timeout elapses.
///
/// The probe runs at least once. `Ok(None)` means the deadline passed without
/// a value; probe errors end the loop immediately.
///
/// # Errors
///
/// Returns the first error the probe returns.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn returns_first_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<Option<u32>, ()> = poll_until(PollPolicy::millis(100, 1_000), || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok((n == 3).then_some(n)) }
        })
        .await;

        assert_eq!(result, Ok(Some(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let started = Instant::now();
        let result: Result<Option<()>, ()> =
            poll_until(PollPolicy::millis(300, 1_000), || async { Ok(None) }).await;

        assert_eq!(result, Ok(None));
        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_stops_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<Option<()>, &str> = poll_until(PollPolicy::millis(10, 1_000), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
