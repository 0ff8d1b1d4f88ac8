//! Simulated environment.
//!
//! Two clock modes share one seeded RNG:
//!
//! - **Manual**: time moves only through [`SimEnv::advance`]. Used by the
//!   in-memory scenario world.
//! - **Runtime**: time follows tokio's clock, which turmoil controls. Used
//!   when the real async runtime runs inside a turmoil host.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ringnet_core::Environment;

/// Wall-clock seconds reported at simulation start.
const EPOCH_OFFSET: f64 = 1_700_000_000.0;

#[derive(Debug)]
enum Clock {
    Manual(Mutex<Instant>),
    Runtime,
}

#[derive(Debug)]
struct Inner {
    start: Instant,
    clock: Clock,
    rng: Mutex<ChaCha8Rng>,
}

/// Deterministic [`Environment`]. Clones share clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    inner: Arc<Inner>,
}

impl SimEnv {
    /// Manual clock with a fixed seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Manual clock with the given seed.
    pub fn with_seed(seed: u64) -> Self {
        let start = Instant::now();
        Self::build(start, Clock::Manual(Mutex::new(start)), seed)
    }

    /// Clock driven by the tokio runtime (turmoil's simulated time).
    ///
    /// Must be called inside a turmoil host or client.
    pub fn runtime_clock(seed: u64) -> Self {
        Self::build(tokio::time::Instant::now().into_std(), Clock::Runtime, seed)
    }

    fn build(start: Instant, clock: Clock, seed: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                start,
                clock,
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            }),
        }
    }

    /// Move a manual clock forward. No effect in runtime mode.
    pub fn advance(&self, by: Duration) {
        if let Clock::Manual(now) = &self.inner.clock {
            *now.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }
    }

    /// Time since the environment was created.
    pub fn elapsed(&self) -> Duration {
        self.now().saturating_duration_since(self.inner.start)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        match &self.inner.clock {
            Clock::Manual(now) => *now.lock().unwrap_or_else(PoisonError::into_inner),
            Clock::Runtime => tokio::time::Instant::now().into_std(),
        }
    }

    fn wall_clock(&self) -> f64 {
        EPOCH_OFFSET + self.elapsed().as_secs_f64()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let manual = matches!(self.inner.clock, Clock::Manual(_));
        if manual {
            self.advance(duration);
        }
        async move {
            if !manual {
                tokio::time::sleep(duration).await;
            }
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
