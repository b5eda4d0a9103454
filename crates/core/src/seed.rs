//! Start-nonce derivation
//!
//! Searches start at a pseudo-random nonce in `[0, NONCE_RANGE)` so that
//! repeated or concurrent requests do not all walk the same range from zero.
//! The generator is seeded from `now_ms * level`; it is not meant to be
//! unpredictable, only spread out.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::params::NONCE_RANGE;

/// Pure start-nonce derivation from a level and a wall-clock reading.
pub fn derive_start_nonce(level: i64, now_ms: u64) -> u64 {
    let seed = now_ms.wrapping_mul(level as u64);
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen_range(0..NONCE_RANGE)
}

/// Chooses the first nonce of a search.
pub trait SeedStrategy {
    fn start_nonce(&self, level: i64) -> u64;
}

/// Production strategy: seeded from the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSeed;

impl SeedStrategy for ClockSeed {
    fn start_nonce(&self, level: i64) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        derive_start_nonce(level, now_ms)
    }
}

/// Always starts at the same nonce. Used for reproducible runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSeed(pub u64);

impl SeedStrategy for FixedSeed {
    fn start_nonce(&self, _level: i64) -> u64 {
        self.0
    }
}

impl<F> SeedStrategy for F
where
    F: Fn(i64) -> u64,
{
    fn start_nonce(&self, level: i64) -> u64 {
        self(level)
    }
}
