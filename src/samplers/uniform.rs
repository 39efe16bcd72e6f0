//! Uniform random sampler drawing subsets without replacement.

use crate::core::Sampler;
use crate::error::CalibrationError;
use crate::utils::UniformRandomGenerator;

use super::check_sample_request;

/// Uniform random sampler drawing subsets without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomSampler {
    /// Construct a new sampler with an entropy seed.
    pub fn new() -> Self {
        Self {
            rng: UniformRandomGenerator::new(),
        }
    }

    /// Construct a sampler from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
        }
    }

    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        Self {
            rng: UniformRandomGenerator::from_optional_seed(seed),
        }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(
        &mut self,
        point_count: usize,
        out_indices: &mut [usize],
    ) -> Result<(), CalibrationError> {
        check_sample_request(point_count, out_indices.len())?;
        self.rng.gen_unique(out_indices, 0, point_count - 1);
        Ok(())
    }
}
