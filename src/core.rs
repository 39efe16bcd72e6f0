//! Core traits of the robust calibration pipeline.
//!
//! The pipeline is split into small components, each behind a trait:
//! - [`Estimator`]: fits candidate models from measurement subsets and
//!   evaluates residuals (the external model collaborator).
//! - [`Sampler`]: draws subsets of measurement indices.
//! - [`Scoring`]: turns residuals into a score and an inlier classification.
//! - [`TerminationCriterion`]: adapts the iteration budget.
//! - [`CalibrationListener`]: observes a running calibration.
//!
//! [`RobustCalibrator`](crate::calibrator::RobustCalibrator) orchestrates them.

use log::debug;
use nalgebra::DMatrix;

use crate::calibrator::RobustCalibrator;
use crate::error::{CalibrationError, SolverError};
use crate::scoring::InliersData;
use crate::types::Measurement;

/// Options forwarded to the estimator for every fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    /// Parameters fixed by the common-axis assumption are held at zero.
    pub common_axis_used: bool,
    /// Closed-form linear solve when `true`, iterative nonlinear solve otherwise.
    pub linear_solver_used: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            common_axis_used: false,
            linear_solver_used: true,
        }
    }
}

/// Estimator responsible for generating and evaluating calibration models.
pub trait Estimator {
    /// Raw sample type of a measurement.
    type Sample;
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Length of the flat parameter vector of a model.
    fn parameter_count(&self) -> usize;

    /// Minimal number of measurements needed to fit a model.
    fn sample_size(&self, options: &FitOptions) -> usize;

    /// Mask of parameters held fixed (`true`) under the given options.
    fn fixed_parameters(&self, options: &FitOptions) -> Vec<bool>;

    /// Fit a model from the measurements at `indices`.
    ///
    /// When `weights` is given it holds one weight per entry of `indices`.
    fn estimate_model(
        &self,
        data: &[Measurement<Self::Sample>],
        indices: &[usize],
        weights: Option<&[f64]>,
        options: &FitOptions,
    ) -> Result<Self::Model, SolverError>;

    /// Non-negative discrepancy between a measurement and the model prediction.
    fn residual(&self, model: &Self::Model, measurement: &Measurement<Self::Sample>) -> f64;

    /// Jacobian of the residual vector of one measurement with respect to the
    /// full parameter vector, evaluated at `model`.
    fn jacobian(&self, model: &Self::Model, measurement: &Measurement<Self::Sample>)
        -> DMatrix<f64>;
}

/// Sampler responsible for drawing subsets of measurement indices.
pub trait Sampler {
    /// Draw `out_indices.len()` distinct indices out of `point_count`.
    fn sample(
        &mut self,
        point_count: usize,
        out_indices: &mut [usize],
    ) -> Result<(), CalibrationError>;

    /// Update the sampler state after an iteration.
    fn update(&mut self, _sample: &[usize], _iteration: usize) {}
}

/// Scoring strategy used to evaluate candidates and classify inliers.
///
/// Scores are "smaller is better" throughout.
pub trait Scoring {
    /// Inlier/outlier threshold on residuals.
    fn threshold(&self) -> f64;

    /// Score a candidate from its per-measurement residuals.
    fn score(&self, residuals: Vec<f64>) -> InliersData;

    /// Whether `best` is good enough to stop searching.
    fn is_stop_satisfied(&self, best: &InliersData, stop_threshold: f64) -> bool;
}

/// Termination criterion deciding when the sampling loop can stop.
pub trait TerminationCriterion {
    /// Update the iteration budget after a new best candidate.
    ///
    /// `iteration` is the number of completed iterations. Returns `true` if the
    /// loop should terminate immediately.
    fn check(
        &mut self,
        best: &InliersData,
        sample_size: usize,
        iteration: usize,
        max_iterations: &mut usize,
    ) -> bool;
}

/// Adaptive criterion following the standard formula
/// `N = log(1 - confidence) / log(1 - w^sample_size)`, where `w` is the
/// inlier ratio of the best candidate.
///
/// The budget only ever shrinks, and never below the completed iterations.
#[derive(Debug, Clone, Copy)]
pub struct RansacTerminationCriterion {
    /// Desired confidence in (0, 1).
    pub confidence: f64,
}

impl RansacTerminationCriterion {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }

    /// Iterations needed to reach the configured confidence at `inlier_ratio`.
    ///
    /// Returns `None` when the ratio carries no information (zero inliers).
    pub fn required_iterations(&self, inlier_ratio: f64, sample_size: usize) -> Option<usize> {
        if !(inlier_ratio > 0.0) {
            return None;
        }
        let p_good_sample = inlier_ratio.min(1.0).powi(sample_size as i32);
        let log_one_minus_p = (1.0 - p_good_sample).max(1e-12).ln();
        let log_one_minus_conf = (1.0 - self.confidence).ln();
        if !log_one_minus_conf.is_finite() || log_one_minus_p >= 0.0 {
            return None;
        }
        let required = (log_one_minus_conf / log_one_minus_p).ceil();
        if required >= usize::MAX as f64 {
            Some(usize::MAX)
        } else {
            Some(required.max(1.0) as usize)
        }
    }
}

impl TerminationCriterion for RansacTerminationCriterion {
    fn check(
        &mut self,
        best: &InliersData,
        sample_size: usize,
        iteration: usize,
        max_iterations: &mut usize,
    ) -> bool {
        if let Some(required) = self.required_iterations(best.inlier_ratio(), sample_size) {
            let updated = required.max(iteration).min(*max_iterations);
            if updated != *max_iterations {
                debug!(
                    "iteration budget {} -> {} (inlier ratio {:.3})",
                    *max_iterations,
                    updated,
                    best.inlier_ratio()
                );
                *max_iterations = updated;
            }
        }
        // The outer loop stops once the (possibly reduced) budget is spent.
        false
    }
}

/// Observer of a running calibration.
///
/// Callbacks run synchronously on the calibrating thread and receive the
/// calibrator itself; any configuration mutator called from a callback while
/// the calibration runs fails with [`CalibrationError::Locked`].
pub trait CalibrationListener<E: Estimator> {
    fn on_start(&mut self, _calibrator: &mut RobustCalibrator<'_, E>) {}

    fn on_end(&mut self, _calibrator: &mut RobustCalibrator<'_, E>) {}

    /// `iteration` is the number of completed iterations.
    fn on_next_iteration(&mut self, _calibrator: &mut RobustCalibrator<'_, E>, _iteration: usize) {}

    /// `progress` is the completed fraction of the current iteration budget.
    fn on_progress_change(&mut self, _calibrator: &mut RobustCalibrator<'_, E>, _progress: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RansacScoring;

    fn data_with_ratio(inliers: usize, total: usize) -> InliersData {
        let residuals = (0..total)
            .map(|i| if i < inliers { 0.0 } else { 10.0 })
            .collect();
        RansacScoring::new(1.0).score(residuals)
    }

    #[test]
    fn required_iterations_follow_standard_formula() {
        let term = RansacTerminationCriterion::new(0.99);
        // w = 0.5, m = 4 -> log(0.01) / log(1 - 0.0625) = 71.36...
        assert_eq!(term.required_iterations(0.5, 4), Some(72));
        assert_eq!(term.required_iterations(0.0, 4), None);
        assert_eq!(term.required_iterations(1.0, 4), Some(1));
    }

    #[test]
    fn budget_only_shrinks_and_respects_completed_iterations() {
        let mut term = RansacTerminationCriterion::new(0.99);
        let mut budget = 1000;

        assert!(!term.check(&data_with_ratio(50, 100), 4, 10, &mut budget));
        assert_eq!(budget, 72);

        // A worse ratio never raises the budget again.
        term.check(&data_with_ratio(10, 100), 4, 20, &mut budget);
        assert_eq!(budget, 72);

        // Perfect ratio clamps to the completed iterations.
        term.check(&data_with_ratio(100, 100), 4, 30, &mut budget);
        assert_eq!(budget, 30);
    }

    #[test]
    fn no_inliers_leaves_budget_untouched() {
        let mut term = RansacTerminationCriterion::new(0.99);
        let mut budget = 500;
        term.check(&data_with_ratio(0, 10), 3, 1, &mut budget);
        assert_eq!(budget, 500);
    }
}
