//! Environment abstraction.
//!
//! The engine reads time and randomness only through [`Environment`], so a
//! simulation can substitute a manual clock and a seeded RNG.

use std::{
    future::Future,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use rand::RngCore;

/// Source of time and randomness.
pub trait Environment: Send + Sync + 'static {
    /// Monotonic time used for every timeout and interval.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch, stamped into token frames.
    fn wall_clock(&self) -> f64;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Uniform random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Uniform random float in `[0, 1)`.
    fn random_unit(&self) -> f64 {
        // 53 bits of mantissa
        (self.random_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform random integer in `[0, bound)`; zero when `bound` is zero.
    fn random_below(&self, bound: u64) -> u64 {
        if bound == 0 { 0 } else { self.random_u64() % bound }
    }
}

/// Production environment: system clock, thread RNG, tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0.0, |elapsed| elapsed.as_secs_f64())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        async move {
            tokio::time::sleep(duration).await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEnv;

    #[test]
    fn random_helpers_stay_in_range() {
        let env = TestEnv::with_seed(7);
        for _ in 0..1_000 {
            let unit = env.random_unit();
            assert!((0.0..1.0).contains(&unit));
            assert!(env.random_below(5) < 5);
        }
        assert_eq!(env.random_below(0), 0);
    }

    #[test]
    fn system_wall_clock_is_after_2020() {
        assert!(SystemEnv.wall_clock() > 1_577_836_800.0);
    }
}
