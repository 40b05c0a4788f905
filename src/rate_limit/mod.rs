//! API rate limiting, per `spec.md` §5: a strict minimum inter-call
//! interval enforced by sleeping to a deadline, not a token bucket — a
//! client that calls twice in quick succession waits out the remainder
//! of the interval rather than borrowing against a future allowance.
//!
//! Discogs requires >=2s between calls, Last.fm >=1s. Kept as a
//! DashMap-keyed registry (the teacher's `RateLimiter` shape) in case a
//! future worker shares one limiter across more than one named API.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// One named API's minimum-interval gate.
struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Sleeps, if necessary, until `min_interval` has elapsed since the
    /// previous call returned, then records now as the new last call.
    async fn wait_turn(&self) {
        let deadline = {
            let mut last_call = self.last_call.lock().expect("throttle mutex poisoned");
            let now = Instant::now();
            let wait = last_call
                .map(|last| (last + self.min_interval).saturating_duration_since(now))
                .unwrap_or(Duration::ZERO);
            *last_call = Some(now + wait);
            wait
        };
        if !deadline.is_zero() {
            sleep(deadline).await;
        }
    }
}

/// Per-API throttle registry. One process owns one `RateLimiter`; each
/// named API (`"discogs"`, `"lastfm"`) gets its own independent gate,
/// created lazily with the interval passed on first use.
pub struct RateLimiter {
    throttles: DashMap<String, Throttle>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { throttles: DashMap::new() }
    }

    /// Blocks the caller (cooperatively, via `tokio::time::sleep`) until
    /// it is safe to make the next call to `api`, whose minimum interval
    /// is `min_interval` — the same value every caller for that API name
    /// is expected to pass.
    pub async fn throttle(&self, api: &str, min_interval: Duration) {
        if !self.throttles.contains_key(api) {
            self.throttles.entry(api.to_string()).or_insert_with(|| Throttle::new(min_interval));
        }
        let entry = self.throttles.get(api).expect("just inserted");
        entry.wait_turn().await;
    }
}

/// Discogs' documented minimum interval between unauthenticated calls.
pub const DISCOGS_MIN_INTERVAL: Duration = Duration::from_secs(2);
/// Last.fm's minimum interval between calls.
pub const LASTFM_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.throttle("discogs", Duration::from_millis(200)).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn second_call_waits_out_remaining_interval() {
        let limiter = RateLimiter::new();
        limiter.throttle("lastfm", Duration::from_millis(150)).await;
        let start = Instant::now();
        limiter.throttle("lastfm", Duration::from_millis(150)).await;
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn independent_apis_do_not_block_each_other() {
        let limiter = RateLimiter::new();
        limiter.throttle("discogs", Duration::from_millis(500)).await;
        let start = Instant::now();
        limiter.throttle("lastfm", Duration::from_millis(500)).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn call_after_interval_has_elapsed_does_not_wait() {
        let limiter = RateLimiter::new();
        limiter.throttle("lastfm", Duration::from_millis(30)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let start = Instant::now();
        limiter.throttle("lastfm", Duration::from_millis(30)).await;
        assert!(start.elapsed() < Duration::from_millis(15));
    }
}
