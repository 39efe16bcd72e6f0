//! Runtime wrappers exposing the built-in samplers and scorers via enums, and
//! the [`VariantStrategy`] bundling both for one [`RobustMethod`].
//!
//! The calibrator holds a single strategy value and dispatches through it
//! instead of relying on one type per robust method.

use crate::core::{Sampler, Scoring};
use crate::error::CalibrationError;
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{InliersData, LmedsScoring, MsacScoring, RansacScoring};
use crate::settings::{CalibrationSettings, RobustMethod};
use crate::utils::UniformRandomGenerator;

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Prosac(ProsacSampler),
}

impl Sampler for SamplerChoice {
    fn sample(
        &mut self,
        point_count: usize,
        out_indices: &mut [usize],
    ) -> Result<(), CalibrationError> {
        match self {
            SamplerChoice::Uniform(s) => s.sample(point_count, out_indices),
            SamplerChoice::Prosac(s) => s.sample(point_count, out_indices),
        }
    }

    fn update(&mut self, sample: &[usize], iteration: usize) {
        match self {
            SamplerChoice::Uniform(s) => s.update(sample, iteration),
            SamplerChoice::Prosac(s) => s.update(sample, iteration),
        }
    }
}

/// Runtime scoring selection.
pub enum ScoringChoice {
    Ransac(RansacScoring),
    Msac(MsacScoring),
    Lmeds(LmedsScoring),
}

impl Scoring for ScoringChoice {
    fn threshold(&self) -> f64 {
        match self {
            ScoringChoice::Ransac(s) => s.threshold(),
            ScoringChoice::Msac(s) => s.threshold(),
            ScoringChoice::Lmeds(s) => s.threshold(),
        }
    }

    fn score(&self, residuals: Vec<f64>) -> InliersData {
        match self {
            ScoringChoice::Ransac(s) => s.score(residuals),
            ScoringChoice::Msac(s) => s.score(residuals),
            ScoringChoice::Lmeds(s) => s.score(residuals),
        }
    }

    fn is_stop_satisfied(&self, best: &InliersData, stop_threshold: f64) -> bool {
        match self {
            ScoringChoice::Ransac(s) => s.is_stop_satisfied(best, stop_threshold),
            ScoringChoice::Msac(s) => s.is_stop_satisfied(best, stop_threshold),
            ScoringChoice::Lmeds(s) => s.is_stop_satisfied(best, stop_threshold),
        }
    }
}

/// Sampling and scoring policy of one robust method.
pub struct VariantStrategy {
    method: RobustMethod,
    sampler: SamplerChoice,
    scoring: ScoringChoice,
}

impl VariantStrategy {
    /// Build the strategy for `settings.method`.
    ///
    /// Progressive methods need `quality_scores`; other methods ignore them.
    pub fn from_settings(
        settings: &CalibrationSettings,
        quality_scores: Option<&[f64]>,
    ) -> Result<Self, CalibrationError> {
        let method = settings.method;
        let sampler = if method.requires_quality_scores() {
            let scores = quality_scores.ok_or(CalibrationError::MissingQualityScores)?;
            SamplerChoice::Prosac(ProsacSampler::with_rng(
                scores,
                settings.prosac_convergence_iterations,
                UniformRandomGenerator::from_optional_seed(settings.seed),
            ))
        } else {
            SamplerChoice::Uniform(UniformRandomSampler::from_optional_seed(settings.seed))
        };
        let scoring = match method {
            RobustMethod::Ransac | RobustMethod::Prosac => {
                ScoringChoice::Ransac(RansacScoring::new(settings.threshold))
            }
            RobustMethod::Msac => ScoringChoice::Msac(MsacScoring::new(settings.threshold)),
            RobustMethod::Lmeds | RobustMethod::Promeds => {
                ScoringChoice::Lmeds(LmedsScoring::new(settings.threshold))
            }
        };
        Ok(Self {
            method,
            sampler,
            scoring,
        })
    }

    pub fn method(&self) -> RobustMethod {
        self.method
    }

    pub fn uses_quality_scores(&self) -> bool {
        matches!(self.sampler, SamplerChoice::Prosac(_))
    }

    pub fn sample(
        &mut self,
        point_count: usize,
        out_indices: &mut [usize],
    ) -> Result<(), CalibrationError> {
        self.sampler.sample(point_count, out_indices)
    }

    pub fn update(&mut self, sample: &[usize], iteration: usize) {
        self.sampler.update(sample, iteration);
    }

    pub fn score(&self, residuals: Vec<f64>) -> InliersData {
        self.scoring.score(residuals)
    }

    pub fn threshold(&self) -> f64 {
        self.scoring.threshold()
    }

    pub fn is_stop_satisfied(&self, best: &InliersData, stop_threshold: f64) -> bool {
        self.scoring.is_stop_satisfied(best, stop_threshold)
    }
}
