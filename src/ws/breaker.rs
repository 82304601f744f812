//! Per-client inbound admission control using Governor (GCRA algorithm)
//!
//! One token is refilled every `period`, up to `capacity` tokens. Each
//! inbound frame costs one token; a frame arriving on an empty bucket trips
//! the breaker and the connection is closed as busy.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct Breaker {
    limiter: DefaultDirectRateLimiter,
    capacity: u32,
    period: Duration,
}

impl Breaker {
    /// Build a breaker; `None` when capacity or period is zero (disabled)
    pub fn new(capacity: u32, period: Duration) -> Option<Self> {
        let burst = NonZeroU32::new(capacity)?;
        let quota = Quota::with_period(period)?.allow_burst(burst);

        Some(Self {
            limiter: RateLimiter::direct(quota),
            capacity,
            period,
        })
    }

    /// Take one token; false when the bucket is empty
    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("capacity", &self.capacity)
            .field("period", &self.period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_disables() {
        assert!(Breaker::new(0, Duration::from_secs(1)).is_none());
        assert!(Breaker::new(3, Duration::ZERO).is_none());
    }

    #[test]
    fn test_burst_then_reject() {
        let breaker = Breaker::new(3, Duration::from_secs(2)).unwrap();
        assert!(breaker.allow());
        assert!(breaker.allow());
        assert!(breaker.allow());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_refills_after_period() {
        let breaker = Breaker::new(1, Duration::from_millis(50)).unwrap();
        assert!(breaker.allow());
        assert!(!breaker.allow());
        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow());
    }
}
