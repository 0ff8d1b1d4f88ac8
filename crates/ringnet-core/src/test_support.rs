//! Deterministic environment for unit tests.

use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::env::Environment;

/// Manual clock plus seeded RNG.
pub struct TestEnv {
    start: Instant,
    now: Mutex<Instant>,
    rng: Mutex<ChaCha8Rng>,
}

impl TestEnv {
    pub fn with_seed(seed: u64) -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Mutex::new(start),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wall_clock(&self) -> f64 {
        1_700_000_000.0 + self.now().duration_since(self.start).as_secs_f64()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
