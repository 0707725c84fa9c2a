//! Deterministic random number generation and episode seed derivation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through one EpisodeRng per composer instance,
//! reseeded wholesale at every episode reset. The sensor, scenario, and
//! patient streams are NOT drawn from that stream — they get their own
//! seeds, derived through independent folding steps, so superficially
//! similar root seeds never produce correlated noise.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

/// Derived seeds are kept below 2^31: downstream consumers treat them
/// as signed 32-bit values.
pub const SEED_MODULUS: u64 = 1 << 31;

/// Upper bound (exclusive) for the base seed draw.
pub const BASE_SEED_RANGE: u64 = 1000;

/// Fixed one-way folding function for seed derivation.
///
/// splitmix64 finalizer: full-avalanche, so consecutive inputs land far
/// apart in the output space. Pure — the determinism tests depend on it.
pub fn fold_seed(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (z ^ (z >> 31)) % SEED_MODULUS
}

/// The 4-tuple of seeds owned by one episode, regenerated wholesale on
/// every reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSeeds {
    /// Drawn uniformly from [0, BASE_SEED_RANGE) off the episode stream.
    pub base: u64,
    /// Sensor noise stream.
    pub sensor: u64,
    /// Scenario (meal) generation stream.
    pub scenario: u64,
    /// Patient initial-state randomization stream.
    pub patient: u64,
}

impl EpisodeSeeds {
    /// Derive the full tuple from the episode stream.
    ///
    /// Chain: sensor = fold(base), scenario = fold(sensor + 1),
    /// patient = fold(scenario + 1). Each step folds the previous output,
    /// so the four streams decorrelate even for adjacent base seeds.
    pub fn derive(rng: &mut EpisodeRng) -> Self {
        let base = rng.next_u64_below(BASE_SEED_RANGE);
        let sensor = fold_seed(base);
        let scenario = fold_seed(sensor + 1);
        let patient = fold_seed(scenario + 1);
        Self { base, sensor, scenario, patient }
    }
}

/// The episode's own random stream: patient-set sampling and start
/// time-of-day come from here, never from the derived seeds.
pub struct EpisodeRng {
    inner: Pcg64Mcg,
}

impl EpisodeRng {
    pub fn seed_from(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_seed_is_pure_and_bounded() {
        for x in [0u64, 1, 41, 999, u64::MAX] {
            assert_eq!(fold_seed(x), fold_seed(x));
            assert!(fold_seed(x) < SEED_MODULUS);
        }
    }

    #[test]
    fn adjacent_inputs_diverge() {
        // The fold must avalanche: consecutive inputs may not produce
        // consecutive outputs.
        let a = fold_seed(100);
        let b = fold_seed(101);
        assert_ne!(a, b);
        assert!(a.abs_diff(b) > 1);
    }

    #[test]
    fn derivation_is_reproducible() {
        let mut rng_a = EpisodeRng::seed_from(7);
        let mut rng_b = EpisodeRng::seed_from(7);
        assert_eq!(EpisodeSeeds::derive(&mut rng_a), EpisodeSeeds::derive(&mut rng_b));
    }

    #[test]
    fn base_seed_stays_in_range() {
        let mut rng = EpisodeRng::seed_from(123);
        for _ in 0..100 {
            let seeds = EpisodeSeeds::derive(&mut rng);
            assert!(seeds.base < BASE_SEED_RANGE);
        }
    }
}
