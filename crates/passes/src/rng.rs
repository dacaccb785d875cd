//! Seedable randomness facade shared by every pass.
//!
//! One generator per pipeline run: seeded exactly once by the orchestrator,
//! then threaded through every pass so that a fixed nonzero seed makes the
//! whole run reproducible (same predicate constants, split keys, XOR keys,
//! and selection rolls). Seed 0 draws entropy from the OS instead.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug)]
pub struct Prng {
    inner: StdRng,
}

impl Prng {
    /// Seeds the stream. A zero seed selects a nondeterministic sequence.
    pub fn from_seed(seed: u64) -> Self {
        let inner = if seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self { inner }
    }

    /// True with probability `percent`/100. Values of 100 or more always hit.
    pub fn roll(&mut self, percent: u32) -> bool {
        self.inner.random_range(0u32..100) < percent
    }

    /// Uniform draw from the inclusive range `[min, max]`.
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        self.inner.random_range(min..=max)
    }

    pub fn byte(&mut self) -> u8 {
        self.inner.random()
    }
}
