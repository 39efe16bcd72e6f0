//! PROSAC sampler: progressively grows the pool of high-quality measurements.
//!
//! Measurements are ranked by descending quality score. Early subsets are drawn
//! from the few best-ranked measurements; the pool grows following the PROSAC
//! growth function until it covers every measurement, after which sampling
//! is uniform.

use crate::core::Sampler;
use crate::error::CalibrationError;
use crate::utils::UniformRandomGenerator;

use super::check_sample_request;

/// PROSAC sampler over a quality ranking of the measurements.
pub struct ProsacSampler {
    rng: UniformRandomGenerator,
    /// Measurement indices sorted by descending quality.
    ordering: Vec<usize>,
    /// `growth_function[k - 1]` is the iteration at which the pool reaches size `k`.
    growth_function: Vec<usize>,
    sample_size: Option<usize>,
    ransac_convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    /// [`ProsacSampler::with_rng`] with a fixed RNG seed.
    pub fn from_seed(
        quality_scores: &[f64],
        ransac_convergence_iterations: usize,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            quality_scores,
            ransac_convergence_iterations,
            UniformRandomGenerator::from_seed(seed),
        )
    }

    /// Rank measurements by `quality_scores` (higher first, ties keep input order).
    pub fn with_rng(
        quality_scores: &[f64],
        ransac_convergence_iterations: usize,
        rng: UniformRandomGenerator,
    ) -> Self {
        let mut ordering: Vec<usize> = (0..quality_scores.len()).collect();
        ordering.sort_by(|&a, &b| quality_scores[b].total_cmp(&quality_scores[a]));
        Self {
            rng,
            ordering,
            growth_function: Vec::new(),
            sample_size: None,
            ransac_convergence_iterations: ransac_convergence_iterations.max(1),
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    /// Measurement indices in sampling priority order.
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Current size of the sampling pool.
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }

    fn initialize(&mut self, sample_size: usize) {
        let point_number = self.ordering.len();
        self.sample_size = Some(sample_size);
        self.growth_function = vec![0; point_number];

        // T_m: expected number of samples drawn from the top `m` points.
        let mut t_n = self.ransac_convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        let mut t_n_prime: usize = 1;
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + (t_n_plus1 - t_n).ceil().max(0.0) as usize;
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }

        self.subset_size = sample_size;
        self.kth_sample_number = 1;
    }
}

impl Sampler for ProsacSampler {
    fn sample(
        &mut self,
        point_count: usize,
        out_indices: &mut [usize],
    ) -> Result<(), CalibrationError> {
        let sample_size = out_indices.len();
        check_sample_request(point_count, sample_size)?;
        if point_count != self.ordering.len() {
            return Err(CalibrationError::QualityScoresMismatch {
                expected: point_count,
                actual: self.ordering.len(),
            });
        }
        if self.sample_size != Some(sample_size) {
            self.initialize(sample_size);
        }

        let t = self.kth_sample_number;
        if t > self.ransac_convergence_iterations {
            self.rng.gen_unique(out_indices, 0, point_count - 1);
        } else {
            if t > self.growth_function[self.subset_size - 1] && self.subset_size < point_count {
                self.subset_size += 1;
            }
            let pool = self.subset_size;
            let newest = pool - 1;
            if self.growth_function[newest] < t || sample_size == 1 {
                self.rng.gen_unique(out_indices, 0, newest);
            } else {
                // The newest pool member is always part of the subset.
                let (head, last) = out_indices.split_at_mut(sample_size - 1);
                self.rng.gen_unique(head, 0, pool - 2);
                last[0] = newest;
            }
        }

        for index in out_indices.iter_mut() {
            *index = self.ordering[*index];
        }
        self.kth_sample_number += 1;
        Ok(())
    }
}
