//! Cooperative pacing between calls to the same upstream site.

use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Blocks callers so that consecutive [`wait`](Self::wait) calls are at least
/// one interval apart. The first call never blocks.
pub struct Throttle {
    limiter: Option<DirectRateLimiter>,
    clock: DefaultClock,
    interval: Duration,
}

impl Throttle {
    /// A zero interval disables throttling.
    pub fn per_interval(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(RateLimiter::direct);
        Self {
            limiter,
            clock: DefaultClock::default(),
            interval,
        }
    }

    pub fn disabled() -> Self {
        Self::per_interval(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn wait(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while let Err(not_until) = limiter.check() {
            thread::sleep(not_until.wait_time_from(self.clock.now()));
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn first_call_passes_and_second_waits_one_interval() {
        let throttle = Throttle::per_interval(Duration::from_millis(40));
        let started = Instant::now();
        throttle.wait();
        assert!(started.elapsed() < Duration::from_millis(40));

        throttle.wait();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn zero_interval_never_blocks() {
        let throttle = Throttle::disabled();
        let started = Instant::now();
        for _ in 0..100 {
            throttle.wait();
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
