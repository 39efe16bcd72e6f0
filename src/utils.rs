//! Miscellaneous utilities shared across the calibrators.
//!
//! This module holds a small wrapper around `rand` drawing unique index sets,
//! plus the order statistics used by the median-based scorers.

use rand::distributions::Uniform;
use rand::prelude::*;

/// Uniform index generator drawing sets of distinct values.
///
/// By default this uses an entropy seeded RNG, but test code (and any caller
/// needing reproducible calibrations) can construct it from a fixed seed.
pub struct UniformRandomGenerator {
    rng: StdRng,
}

impl Default for UniformRandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomGenerator {
    /// Construct with an entropy seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Construct with a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is given, entropy seeded otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::from_seed)
    }

    /// Fill `out` with distinct integers drawn uniformly from `[min, max]`.
    ///
    /// The range must hold at least `out.len()` values. Rejection sampling is
    /// fine here since subsets are small compared to the measurement count.
    pub fn gen_unique(&mut self, out: &mut [usize], min: usize, max: usize) {
        if out.is_empty() {
            return;
        }
        debug_assert!(max >= min && max - min + 1 >= out.len());
        let dist = Uniform::new_inclusive(min, max);
        for i in 0..out.len() {
            loop {
                let candidate = self.rng.sample(dist);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Median of `values`, reordering the slice in place. Returns `NaN` when empty.
pub fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        0.5 * (lower_max + upper)
    }
}
