//! Shared API rate limiter
//!
//! Spaces successive permits at least `min_interval` apart, no matter how
//! many workers ask for them. This is the engine's only deliberate
//! backpressure on the upstream data provider.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Minimum-interval rate limiter shared by all workers of a manager
pub struct RateLimiter {
    // GCRA with a burst of one: a single permit per period
    limiter: Option<DirectLimiter>,
    min_interval: Duration,
    permits: AtomicU64,
    last_permit: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing one call every `min_interval`
    ///
    /// A zero interval disables limiting.
    pub fn with_interval(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval).map(GovernorLimiter::direct);

        Self {
            limiter,
            min_interval,
            permits: AtomicU64::new(0),
            last_permit: Mutex::new(None),
        }
    }

    /// Create a limiter from a call rate
    ///
    /// Non-positive or non-finite rates disable limiting.
    pub fn per_second(calls_per_second: f64) -> Self {
        let interval = if calls_per_second > 0.0 {
            Duration::try_from_secs_f64(calls_per_second.recip()).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    /// Wait until a permit is available, then take it
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let granted = Instant::now();
        *self.last_permit.lock() = Some(granted);
        let total = self.permits.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(permits = total, "Rate limiter permit granted");
    }

    /// Configured minimum interval between permits
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Whether this limiter ever waits
    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Number of permits granted so far
    pub fn permits_granted(&self) -> u64 {
        self.permits.load(Ordering::Relaxed)
    }

    /// When the most recent permit was granted
    pub fn last_permit(&self) -> Option<Instant> {
        *self.last_permit.lock()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .field("permits", &self.permits_granted())
            .finish_non_exhaustive()
    }
}
