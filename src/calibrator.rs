//! Robust calibrator orchestrating sampling, scoring, refinement and
//! covariance estimation.
//!
//! [`RobustCalibrator`] is a small state machine (`NotReady -> Ready ->
//! Running`) wrapping any [`Estimator`]. The robust method is selected through
//! [`CalibrationSettings::method`] and executed by a single
//! [`VariantStrategy`] value.

use log::{debug, trace, warn};
use nalgebra::DMatrix;

use crate::choices::VariantStrategy;
use crate::core::{CalibrationListener, Estimator, RansacTerminationCriterion, TerminationCriterion};
use crate::error::CalibrationError;
use crate::optimisers::{estimate_covariance, LocalOptimizer, WeightedLeastSquaresOptimizer};
use crate::scoring::InliersData;
use crate::settings::{CalibrationSettings, RobustMethod};
use crate::types::Measurement;

/// Lifecycle state of a [`RobustCalibrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratorState {
    /// Not enough data (or missing quality scores) to calibrate.
    NotReady,
    Ready,
    Running,
}

/// Outcome of a successful calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult<M> {
    pub model: M,
    /// Parameter covariance, `None` when not kept or not computable.
    pub covariance: Option<DMatrix<f64>>,
    /// Inliers, residuals and score of `model` over all measurements.
    pub inliers_data: InliersData,
    pub method: RobustMethod,
    /// Number of sampling iterations performed.
    pub iterations: usize,
    /// Whether the final refinement replaced the best candidate.
    pub refined: bool,
}

/// Robust calibrator over a batch of measurements.
///
/// The listener is borrowed for `'a`; the calibrator never owns it.
pub struct RobustCalibrator<'a, E: Estimator> {
    estimator: E,
    settings: CalibrationSettings,
    measurements: Vec<Measurement<E::Sample>>,
    quality_scores: Option<Vec<f64>>,
    listener: Option<&'a mut dyn CalibrationListener<E>>,
    refiner: Box<dyn LocalOptimizer<E>>,
    running: bool,
    result: Option<EstimationResult<E::Model>>,
}

impl<'a, E: Estimator> RobustCalibrator<'a, E> {
    /// Calibrator with default settings and no measurements.
    pub fn new(estimator: E) -> Self {
        Self {
            estimator,
            settings: CalibrationSettings::default(),
            measurements: Vec::new(),
            quality_scores: None,
            listener: None,
            refiner: Box::new(WeightedLeastSquaresOptimizer),
            running: false,
            result: None,
        }
    }

    pub fn with_settings(
        estimator: E,
        settings: CalibrationSettings,
    ) -> Result<Self, CalibrationError> {
        let mut calibrator = Self::new(estimator);
        calibrator.set_settings(settings)?;
        Ok(calibrator)
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn measurements(&self) -> &[Measurement<E::Sample>] {
        &self.measurements
    }

    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
    }

    pub fn method(&self) -> RobustMethod {
        self.settings.method
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> CalibratorState {
        if self.running {
            CalibratorState::Running
        } else if self.is_ready() {
            CalibratorState::Ready
        } else {
            CalibratorState::NotReady
        }
    }

    pub fn is_ready(&self) -> bool {
        self.check_readiness().is_ok()
    }

    /// Smallest subset the estimator can fit under the current options.
    pub fn minimum_subset_size(&self) -> usize {
        self.estimator.sample_size(&self.settings.fit_options())
    }

    /// Subset size drawn per iteration.
    pub fn subset_size(&self) -> usize {
        self.settings
            .preliminary_subset_size
            .unwrap_or_else(|| self.minimum_subset_size())
    }

    pub fn last_result(&self) -> Option<&EstimationResult<E::Model>> {
        self.result.as_ref()
    }

    pub fn estimated_model(&self) -> Option<&E::Model> {
        self.result.as_ref().map(|r| &r.model)
    }

    pub fn estimated_covariance(&self) -> Option<&DMatrix<f64>> {
        self.result.as_ref().and_then(|r| r.covariance.as_ref())
    }

    pub fn inliers_data(&self) -> Option<&InliersData> {
        self.result.as_ref().map(|r| &r.inliers_data)
    }

    fn ensure_idle(&self) -> Result<(), CalibrationError> {
        if self.running {
            Err(CalibrationError::Locked)
        } else {
            Ok(())
        }
    }

    fn validate_settings(&self, settings: &CalibrationSettings) -> Result<(), CalibrationError> {
        settings.validate()?;
        if let Some(size) = settings.preliminary_subset_size {
            let minimum = self.estimator.sample_size(&settings.fit_options());
            if size < minimum {
                return Err(CalibrationError::InvalidConfiguration(format!(
                    "subset size {size} is below the minimum of {minimum}"
                )));
            }
        }
        Ok(())
    }

    /// Apply `change` to a copy of the settings and commit it if valid.
    fn update_settings(
        &mut self,
        change: impl FnOnce(&mut CalibrationSettings),
    ) -> Result<(), CalibrationError> {
        self.ensure_idle()?;
        let mut settings = self.settings.clone();
        change(&mut settings);
        self.validate_settings(&settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn set_settings(&mut self, settings: CalibrationSettings) -> Result<(), CalibrationError> {
        self.update_settings(|s| *s = settings)
    }

    pub fn set_method(&mut self, method: RobustMethod) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.method = method)
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.threshold = threshold)
    }

    pub fn set_stop_threshold(&mut self, stop_threshold: f64) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.stop_threshold = stop_threshold)
    }

    pub fn set_confidence(&mut self, confidence: f64) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.confidence = confidence)
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.max_iterations = max_iterations)
    }

    pub fn set_progress_delta(&mut self, progress_delta: f64) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.progress_delta = progress_delta)
    }

    pub fn set_common_axis_used(&mut self, used: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.common_axis_used = used)
    }

    pub fn set_linear_calibrator_used(&mut self, used: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.linear_calibrator_used = used)
    }

    pub fn set_preliminary_solution_refined(&mut self, refined: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.preliminary_solution_refined = refined)
    }

    pub fn set_result_refined(&mut self, refined: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.result_refined = refined)
    }

    pub fn set_refinement_mandatory(&mut self, mandatory: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.refinement_mandatory = mandatory)
    }

    pub fn set_covariance_kept(&mut self, kept: bool) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.covariance_kept = kept)
    }

    /// `None` draws subsets of the problem minimum.
    pub fn set_preliminary_subset_size(&mut self, size: Option<usize>) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.preliminary_subset_size = size)
    }

    pub fn set_prosac_convergence_iterations(
        &mut self,
        iterations: usize,
    ) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.prosac_convergence_iterations = iterations)
    }

    pub fn set_seed(&mut self, seed: Option<u64>) -> Result<(), CalibrationError> {
        self.update_settings(|s| s.seed = seed)
    }

    /// Replace the measurement batch.
    ///
    /// Quality scores that no longer match the new batch size are dropped.
    pub fn set_measurements(
        &mut self,
        measurements: Vec<Measurement<E::Sample>>,
    ) -> Result<(), CalibrationError> {
        self.ensure_idle()?;
        if let Some(scores) = &self.quality_scores {
            if scores.len() != measurements.len() {
                debug!(
                    "dropping {} quality scores after measurement batch changed to {}",
                    scores.len(),
                    measurements.len()
                );
                self.quality_scores = None;
            }
        }
        self.measurements = measurements;
        Ok(())
    }

    /// Set one non-negative score per measurement (higher is better).
    ///
    /// Scores must be set after the measurements they rank.
    pub fn set_quality_scores(&mut self, scores: Option<Vec<f64>>) -> Result<(), CalibrationError> {
        self.ensure_idle()?;
        if let Some(scores) = &scores {
            if scores.len() != self.measurements.len() {
                return Err(CalibrationError::QualityScoresMismatch {
                    expected: self.measurements.len(),
                    actual: scores.len(),
                });
            }
            if let Some(bad) = scores.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
                return Err(CalibrationError::InvalidConfiguration(format!(
                    "quality scores must be finite and non-negative, got {bad}"
                )));
            }
        }
        self.quality_scores = scores;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: Option<&'a mut dyn CalibrationListener<E>>,
    ) -> Result<(), CalibrationError> {
        self.ensure_idle()?;
        self.listener = listener;
        Ok(())
    }

    /// Replace the refinement strategy (weighted least squares by default).
    pub fn set_local_optimizer(
        &mut self,
        optimizer: Box<dyn LocalOptimizer<E>>,
    ) -> Result<(), CalibrationError> {
        self.ensure_idle()?;
        self.refiner = optimizer;
        Ok(())
    }

    fn check_readiness(&self) -> Result<(), CalibrationError> {
        let required = self.subset_size();
        if self.measurements.len() < required {
            return Err(CalibrationError::NotEnoughMeasurements {
                required,
                available: self.measurements.len(),
            });
        }
        if self.settings.method.requires_quality_scores() {
            match &self.quality_scores {
                None => return Err(CalibrationError::MissingQualityScores),
                Some(scores) if scores.len() != self.measurements.len() => {
                    return Err(CalibrationError::QualityScoresMismatch {
                        expected: self.measurements.len(),
                        actual: scores.len(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Run the robust calibration over the current measurements.
    ///
    /// On success the result is also kept for the post-calibration accessors.
    pub fn calibrate(&mut self) -> Result<EstimationResult<E::Model>, CalibrationError> {
        self.ensure_idle()?;
        self.check_readiness()?;
        let mut strategy =
            VariantStrategy::from_settings(&self.settings, self.quality_scores.as_deref())?;

        self.result = None;
        self.running = true;
        let mut listener = self.listener.take();
        let outcome = self.run(&mut strategy, &mut listener);
        self.running = false;

        if let Ok(result) = &outcome {
            self.result = Some(result.clone());
            if let Some(l) = listener.as_deref_mut() {
                l.on_end(self);
            }
        }
        if self.listener.is_none() {
            self.listener = listener;
        }
        outcome
    }

    fn evaluate(&self, model: &E::Model, strategy: &VariantStrategy) -> InliersData {
        let residuals = self
            .measurements
            .iter()
            .map(|m| self.estimator.residual(model, m))
            .collect();
        strategy.score(residuals)
    }

    /// Refine `candidate` over its own inliers, keeping it when the refit
    /// fails or scores worse.
    fn refine_preliminary(
        &mut self,
        strategy: &VariantStrategy,
        candidate: E::Model,
        data: InliersData,
        subset_size: usize,
    ) -> (E::Model, InliersData) {
        let inliers = data.inlier_indices();
        if inliers.len() < subset_size {
            return (candidate, data);
        }
        let options = self.settings.fit_options();
        match self
            .refiner
            .run(&self.estimator, &self.measurements, &inliers, &candidate, &options)
        {
            Ok(Some(refined)) => {
                let refined_data = self.evaluate(&refined, strategy);
                if data.score.is_better_than(&refined_data.score) {
                    (candidate, data)
                } else {
                    (refined, refined_data)
                }
            }
            Ok(None) => (candidate, data),
            Err(e) => {
                trace!("preliminary refinement skipped: {e}");
                (candidate, data)
            }
        }
    }

    fn run(
        &mut self,
        strategy: &mut VariantStrategy,
        listener: &mut Option<&'a mut dyn CalibrationListener<E>>,
    ) -> Result<EstimationResult<E::Model>, CalibrationError> {
        let settings = self.settings.clone();
        let options = settings.fit_options();
        let subset_size = self.subset_size();
        let point_count = self.measurements.len();
        debug!(
            "starting {} calibration over {} measurements (subset size {})",
            settings.method, point_count, subset_size
        );

        if let Some(l) = listener.as_deref_mut() {
            l.on_start(self);
        }

        let mut termination = RansacTerminationCriterion::new(settings.confidence);
        let mut budget = settings.max_iterations;
        let mut best: Option<(E::Model, InliersData)> = None;
        let mut subset = vec![0usize; subset_size];
        let mut iteration = 0usize;
        let mut last_progress = 0.0;

        while iteration < budget && iteration < settings.max_iterations {
            strategy.sample(point_count, &mut subset)?;
            iteration += 1;

            match self
                .estimator
                .estimate_model(&self.measurements, &subset, None, &options)
            {
                Err(e) => trace!("iteration {iteration}: subset skipped ({e})"),
                Ok(candidate) => {
                    let data = self.evaluate(&candidate, strategy);
                    let (candidate, data) = if settings.preliminary_solution_refined {
                        self.refine_preliminary(strategy, candidate, data, subset_size)
                    } else {
                        (candidate, data)
                    };

                    let improves = best
                        .as_ref()
                        .map_or(true, |(_, current)| data.score.is_better_than(&current.score));
                    if improves {
                        debug!(
                            "iteration {iteration}: new best score {:e} with {} inliers",
                            data.score.value, data.inlier_count
                        );
                        let stop = termination.check(&data, subset_size, iteration, &mut budget);
                        best = Some((candidate, data));
                        if stop {
                            break;
                        }
                    }
                }
            }
            strategy.update(&subset, iteration);

            if let Some(l) = listener.as_deref_mut() {
                l.on_next_iteration(self, iteration);
                let progress = (iteration as f64 / budget.max(1) as f64).min(1.0);
                if progress - last_progress > settings.progress_delta {
                    l.on_progress_change(self, progress);
                    last_progress = progress;
                }
            }

            if let Some((_, current)) = &best {
                if strategy.is_stop_satisfied(current, settings.stop_threshold) {
                    debug!("iteration {iteration}: stop threshold reached");
                    break;
                }
            }
        }

        let Some((mut model, mut inliers_data)) = best.filter(|(_, d)| d.inlier_count > 0) else {
            warn!("{} calibration found no valid candidate in {iteration} iterations", settings.method);
            return Err(CalibrationError::NotEnoughInliers {
                iterations: iteration,
            });
        };

        let mut refined = false;
        let mut refinement_failed = false;
        if settings.result_refined {
            let inliers = inliers_data.inlier_indices();
            match self
                .refiner
                .run(&self.estimator, &self.measurements, &inliers, &model, &options)
            {
                Ok(Some(refit)) => {
                    inliers_data = self.evaluate(&refit, strategy);
                    model = refit;
                    refined = true;
                }
                Ok(None) => debug!("refinement kept the best candidate"),
                Err(e) if settings.refinement_mandatory => {
                    return Err(CalibrationError::RefinementFailed(e));
                }
                Err(e) => {
                    warn!("refinement failed, keeping best candidate: {e}");
                    refinement_failed = true;
                }
            }
        }

        let covariance = if settings.covariance_kept && !refinement_failed {
            estimate_covariance(
                &self.estimator,
                &self.measurements,
                &inliers_data.inlier_indices(),
                &model,
                &options,
            )
        } else {
            None
        };

        if let Some(l) = listener.as_deref_mut() {
            if last_progress < 1.0 {
                l.on_progress_change(self, 1.0);
            }
        }
        debug!(
            "{} calibration finished after {iteration} iterations with {} inliers",
            settings.method, inliers_data.inlier_count
        );
        Ok(EstimationResult {
            model,
            covariance,
            inliers_data,
            method: settings.method,
            iterations: iteration,
            refined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::estimators::{AccelerometerModel, KnownFrameEstimator};
    use crate::models::TriadCalibration;
    use crate::types::SpecificForceSample;
    use nalgebra::Vector3;

    type AccelCalibrator = RobustCalibrator<'static, KnownFrameEstimator<AccelerometerModel>>;

    fn calibrator() -> AccelCalibrator {
        RobustCalibrator::new(KnownFrameEstimator::new(AccelerometerModel))
    }

    fn measurements(n: usize) -> Vec<Measurement<SpecificForceSample>> {
        let cal = TriadCalibration::default();
        (0..n)
            .map(|i| {
                let a = i as f64 * 0.7;
                let f = 9.81 * Vector3::new(a.cos() * 0.6, a.sin() * 0.6, 0.8 * (1.3 * a).cos());
                Measurement::new(SpecificForceSample::new(f, cal.distort(&f)))
            })
            .collect()
    }

    #[test]
    fn readiness_follows_measurements_and_scores() {
        let mut cal = calibrator();
        assert_eq!(cal.state(), CalibratorState::NotReady);
        cal.set_measurements(measurements(3)).unwrap();
        assert_eq!(cal.state(), CalibratorState::NotReady);
        cal.set_measurements(measurements(10)).unwrap();
        assert_eq!(cal.state(), CalibratorState::Ready);

        cal.set_method(RobustMethod::Promeds).unwrap();
        assert_eq!(cal.state(), CalibratorState::NotReady);
        let err = cal.calibrate().unwrap_err();
        assert_eq!(err, CalibrationError::MissingQualityScores);
        assert_eq!(err.kind(), ErrorKind::Readiness);

        cal.set_quality_scores(Some(vec![1.0; 10])).unwrap();
        assert!(cal.is_ready());
    }

    #[test]
    fn subset_size_is_configurable_only_upward() {
        let mut cal = calibrator();
        assert_eq!(cal.minimum_subset_size(), 4);
        assert_eq!(cal.subset_size(), 4);

        let err = cal.set_preliminary_subset_size(Some(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(cal.subset_size(), 4);

        cal.set_preliminary_subset_size(Some(6)).unwrap();
        assert_eq!(cal.subset_size(), 6);

        cal.set_common_axis_used(true).unwrap();
        assert_eq!(cal.minimum_subset_size(), 3);
        cal.set_preliminary_subset_size(Some(3)).unwrap();
        // Dropping the common axis would leave the subset below the minimum.
        assert!(cal.set_common_axis_used(false).is_err());
        assert!(cal.settings().common_axis_used);
    }

    #[test]
    fn rejected_setters_leave_settings_unchanged() {
        let mut cal = calibrator();
        let before = cal.settings().clone();
        assert!(cal.set_confidence(1.5).is_err());
        assert!(cal.set_threshold(-1.0).is_err());
        assert!(cal.set_max_iterations(0).is_err());
        assert!(cal.set_progress_delta(2.0).is_err());
        assert_eq!(cal.settings(), &before);
    }

    #[test]
    fn quality_scores_are_validated_eagerly() {
        let mut cal = calibrator();
        cal.set_measurements(measurements(5)).unwrap();
        let err = cal.set_quality_scores(Some(vec![1.0; 4])).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::QualityScoresMismatch {
                expected: 5,
                actual: 4
            }
        );
        assert!(cal.set_quality_scores(Some(vec![1.0, 2.0, -1.0, 0.0, 1.0])).is_err());
        assert!(cal.quality_scores().is_none());

        cal.set_quality_scores(Some(vec![1.0; 5])).unwrap();
        cal.set_measurements(measurements(6)).unwrap();
        assert!(cal.quality_scores().is_none());
    }

    #[test]
    fn accessors_are_empty_before_calibration() {
        let cal = calibrator();
        assert!(cal.last_result().is_none());
        assert!(cal.estimated_model().is_none());
        assert!(cal.estimated_covariance().is_none());
        assert!(cal.inliers_data().is_none());
        assert_eq!(cal.method(), RobustMethod::Lmeds);
        assert!(!cal.is_running());
    }

    #[test]
    fn calibration_without_outliers_keeps_every_measurement() {
        let mut cal = calibrator();
        cal.set_measurements(measurements(12)).unwrap();
        cal.set_seed(Some(5)).unwrap();
        let result = cal.calibrate().unwrap();
        assert_eq!(result.inliers_data.inlier_count, 12);
        assert!(result.covariance.is_some());
        assert_eq!(cal.state(), CalibratorState::Ready);
        assert_eq!(cal.last_result(), Some(&result));
    }

    #[test]
    fn kept_candidate_is_not_reported_as_refined() {
        let mut cal = calibrator();
        cal.set_measurements(measurements(12)).unwrap();
        cal.set_seed(Some(5)).unwrap();
        cal.set_local_optimizer(Box::new(crate::optimisers::NoopLocalOptimizer))
            .unwrap();
        let result = cal.calibrate().unwrap();
        assert!(!result.refined);
        assert!(result.covariance.is_some());
    }
}
