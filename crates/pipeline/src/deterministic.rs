//! Deterministic utilities for reproducible training
//!
//! Provides LCG-based RNG, seed resolution, shuffling and tie-breaking logic
//! so that two runs with the same seed produce identical splits and models.

use std::num::Wrapping;

/// Seed value that requests an unseeded (non-reproducible) run.
pub const UNSEEDED: i64 = -1;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.wrapping_abs() % Self::MODULUS),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 & (Self::MODULUS - 1)).abs()
    }

    /// Generate random value in range [0, max)
    ///
    /// Uses the high bits of the generator; the low bits of an LCG cycle quickly.
    pub fn next_range(&mut self, max: usize) -> usize {
        if max <= 1 {
            return 0;
        }
        let r = self.next_i64() as u128;
        ((r * max as u128) >> 31) as usize
    }

    /// Uniform value in [0.0, 1.0)
    pub fn next_unit(&mut self) -> f64 {
        self.next_i64() as f64 / Self::MODULUS as f64
    }

    /// Fisher-Yates shuffle driven by this generator
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_range(i + 1);
            items.swap(i, j);
        }
    }
}

/// Resolve a request seed into a concrete generator seed.
///
/// `-1` draws a fresh seed from the thread RNG so repeated runs may differ.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed == UNSEEDED {
        let drawn = rand::random::<u32>() as i64;
        tracing::debug!(seed = drawn, "unseeded run, drew random seed");
        drawn
    } else {
        seed
    }
}

/// Deterministic tie-breaker for split selection
/// Returns consistent ordering based on (feature_idx, bin, node_id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub bin: usize,
    pub node_id: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, bin: usize, node_id: usize) -> Self {
        Self {
            feature_idx,
            bin,
            node_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..1000 {
            let val = rng.next_range(10);
            assert!(val < 10);
        }
        assert_eq!(rng.next_range(1), 0);
        assert_eq!(rng.next_range(0), 0);
    }

    #[test]
    fn test_unit_interval() {
        let mut rng = LcgRng::new(7);
        for _ in 0..1000 {
            let u = rng.next_unit();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_shuffle_is_permutation_and_repeatable() {
        let mut a: Vec<usize> = (0..50).collect();
        let mut b = a.clone();
        LcgRng::new(42).shuffle(&mut a);
        LcgRng::new(42).shuffle(&mut b);
        assert_eq!(a, b);
        assert_ne!(a, (0..50).collect::<Vec<_>>());

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_negative_seeds_are_usable() {
        let mut rng = LcgRng::new(i64::MIN);
        let _ = rng.next_i64();
        assert_eq!(resolve_seed(1234), 1234);
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 100, 0);
        let t2 = SplitTieBreaker::new(0, 100, 1);
        let t3 = SplitTieBreaker::new(1, 50, 0);

        assert!(t1 < t2);
        assert!(t1 < t3);
    }
}
