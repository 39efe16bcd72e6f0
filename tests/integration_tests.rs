//! Integration tests for the robust calibrators.
//!
//! Datasets are synthetic: a known calibration distorts ground-truth inputs
//! and a fraction of the measurements is then corrupted by gross errors.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use inlier_calib::core::FitOptions;
use inlier_calib::estimators::{AccelerometerModel, KnownFrameEstimator};
use inlier_calib::models::{
    CalibrationParameters, GyroscopeCalibration, TriadCalibration, COMMON_AXIS_PARAMETERS,
};
use inlier_calib::optimisers::LocalOptimizer;
use inlier_calib::types::{AngularRateSample, MagneticFluxSample, Measurement, SpecificForceSample};
use inlier_calib::*;
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type AccelCalibrator<'a> = RobustCalibrator<'a, KnownFrameEstimator<AccelerometerModel>>;

fn random_direction(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm = v.norm();
        if norm > 0.1 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn gross_error(rng: &mut StdRng) -> Vector3<f64> {
    rng.gen_range(0.5..2.0) * random_direction(rng)
}

fn true_accelerometer() -> TriadCalibration {
    TriadCalibration::from_components(
        Vector3::new(0.09, -0.05, 0.12),
        Vector3::new(1.5e-3, -2.0e-3, 0.8e-3),
        3.0e-4,
        -1.2e-4,
        2.2e-4,
        4.0e-4,
        -3.1e-4,
        1.7e-4,
    )
}

/// Returns the measurements and the outlier flag of each of them.
fn accelerometer_dataset(
    truth: &TriadCalibration,
    count: usize,
    outlier_fraction: f64,
    noise: f64,
    seed: u64,
) -> (Vec<Measurement<SpecificForceSample>>, Vec<bool>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let outliers = (count as f64 * outlier_fraction).round() as usize;
    let mut measurements = Vec::with_capacity(count);
    let mut flags = Vec::with_capacity(count);
    for i in 0..count {
        let f = 9.81 * random_direction(&mut rng);
        let mut measured = truth.distort(&f);
        if noise > 0.0 {
            measured += noise * random_direction(&mut rng);
        }
        let is_outlier = i % (count / outliers.max(1)) == 0
            && flags.iter().filter(|&&o| o).count() < outliers;
        if is_outlier {
            measured += gross_error(&mut rng);
        }
        measurements.push(Measurement::new(SpecificForceSample::new(f, measured)));
        flags.push(is_outlier);
    }
    (measurements, flags)
}

/// Higher scores for clean measurements, as a quality metric would give.
fn quality_scores(flags: &[bool]) -> Vec<f64> {
    flags
        .iter()
        .enumerate()
        .map(|(i, &outlier)| if outlier { 0.1 } else { 1.0 + (i % 7) as f64 * 0.01 })
        .collect()
}

fn accelerometer_calibrator<'a>(
    measurements: Vec<Measurement<SpecificForceSample>>,
    settings: CalibrationSettings,
) -> AccelCalibrator<'a> {
    let mut calibrator =
        RobustCalibrator::with_settings(KnownFrameEstimator::new(AccelerometerModel), settings)
            .unwrap();
    calibrator.set_measurements(measurements).unwrap();
    calibrator
}

fn seeded(method: RobustMethod) -> CalibrationSettings {
    CalibrationSettings {
        seed: Some(2024),
        ..CalibrationSettings::with_method(method)
    }
}

#[test]
fn every_method_recovers_accelerometer_calibration() {
    let truth = true_accelerometer();
    let (measurements, flags) = accelerometer_dataset(&truth, 60, 0.2, 0.0, 1);
    assert_eq!(flags.iter().filter(|&&o| o).count(), 12);

    for method in RobustMethod::ALL {
        let scores = method.requires_quality_scores().then(|| quality_scores(&flags));
        let result = calibrate_accelerometer(measurements.clone(), seeded(method), scores)
            .unwrap_or_else(|e| panic!("{method} failed: {e}"));

        assert_eq!(result.method, method);
        assert_relative_eq!(
            result.model.to_parameters(),
            truth.to_parameters(),
            epsilon = 1e-8
        );
        let detected: Vec<bool> = result.inliers_data.inliers.iter().map(|&i| !i).collect();
        assert_eq!(detected, flags, "{method} misclassified measurements");
        assert!(result.iterations <= 5000);
    }
}

#[test]
fn gyroscope_calibration_with_outliers() {
    let truth = GyroscopeCalibration::new(
        Vector3::new(2e-3, -1e-3, 3e-3),
        Matrix3::new(1e-3, 2e-4, -1e-4, 3e-4, -2e-3, 1e-4, -2e-4, 4e-4, 1.5e-3),
        Matrix3::new(1e-4, -2e-5, 3e-5, 0.0, 2e-4, -1e-5, 4e-5, 1e-5, -1e-4),
    );
    let mut rng = StdRng::seed_from_u64(77);
    let mut flags = Vec::new();
    let measurements: Vec<_> = (0..80)
        .map(|i| {
            let omega = rng.gen_range(0.1..1.0) * random_direction(&mut rng);
            let f = 9.81 * random_direction(&mut rng);
            let mut measured = truth.distort(&omega, &f);
            let outlier = i % 8 == 3;
            if outlier {
                measured += 0.2 * random_direction(&mut rng);
            }
            flags.push(outlier);
            Measurement::new(AngularRateSample::new(omega, f, measured))
        })
        .collect();

    let settings = CalibrationSettings {
        threshold: 1e-3,
        ..seeded(RobustMethod::Lmeds)
    };
    let result = calibrate_gyroscope(measurements, settings, None).unwrap();
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );
    assert_eq!(result.inliers_data.inlier_count, 70);
    let covariance = result.covariance.unwrap();
    assert_eq!(covariance.shape(), (21, 21));
}

#[test]
fn magnetometer_calibration_with_outliers() {
    let truth = TriadCalibration::from_components(
        Vector3::new(1.5, -3.0, 0.7),
        Vector3::new(0.02, -0.01, 0.015),
        1e-3,
        -2e-3,
        0.5e-3,
        1e-3,
        -0.7e-3,
        2e-3,
    );
    let mut rng = StdRng::seed_from_u64(5);
    let measurements: Vec<_> = (0..50)
        .map(|i| {
            // Earth field of about 50 µT seen from random orientations.
            let m = 50.0 * random_direction(&mut rng);
            let mut measured = truth.distort(&m);
            if i % 5 == 0 {
                measured += 10.0 * gross_error(&mut rng);
            }
            Measurement::new(MagneticFluxSample::new(m, measured))
        })
        .collect();

    let result = calibrate_magnetometer(measurements, seeded(RobustMethod::Msac), None).unwrap();
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );
    assert_eq!(result.inliers_data.inlier_count, 40);
}

#[test]
fn progressive_methods_accept_equal_scores() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 40, 0.1, 0.0, 3);
    for method in [RobustMethod::Prosac, RobustMethod::Promeds] {
        let settings = CalibrationSettings {
            prosac_convergence_iterations: 500,
            ..seeded(method)
        };
        let result =
            calibrate_accelerometer(measurements.clone(), settings, Some(vec![1.0; 40])).unwrap();
        assert_relative_eq!(
            result.model.to_parameters(),
            truth.to_parameters(),
            epsilon = 1e-8
        );
    }
}

#[test]
fn progressive_methods_reject_mismatched_scores() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 20, 0.0, 0.0, 4);
    for method in [RobustMethod::Prosac, RobustMethod::Promeds] {
        let err = calibrate_accelerometer(measurements.clone(), seeded(method), Some(vec![1.0; 19]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err,
            CalibrationError::QualityScoresMismatch {
                expected: 20,
                actual: 19
            }
        );
    }
}

#[test]
fn single_iteration_budget_terminates() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 60, 0.4, 0.0, 6);
    for method in [RobustMethod::Ransac, RobustMethod::Lmeds, RobustMethod::Msac] {
        let settings = CalibrationSettings {
            max_iterations: 1,
            ..seeded(method)
        };
        let mut calibrator = accelerometer_calibrator(measurements.clone(), settings);
        match calibrator.calibrate() {
            Ok(result) => assert_eq!(result.iterations, 1),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Algorithmic),
        }
        assert!(!calibrator.is_running());
    }
}

#[test]
fn common_axis_zeroes_parameters_and_covariance() {
    let truth = TriadCalibration::from_components(
        Vector3::new(0.02, 0.03, -0.04),
        Vector3::new(1e-3, -1e-3, 2e-3),
        0.0,
        0.0,
        2e-4,
        0.0,
        -3e-4,
        5e-4,
    );
    let (measurements, _) = accelerometer_dataset(&truth, 40, 0.15, 0.0, 8);
    let settings = CalibrationSettings {
        common_axis_used: true,
        ..seeded(RobustMethod::Lmeds)
    };
    let mut calibrator = accelerometer_calibrator(measurements, settings);
    assert_eq!(calibrator.minimum_subset_size(), 3);
    let result = calibrator.calibrate().unwrap();

    let params = result.model.to_parameters();
    for &i in COMMON_AXIS_PARAMETERS.iter() {
        assert_eq!(params[i], 0.0);
    }
    assert_relative_eq!(params, truth.to_parameters(), epsilon = 1e-8);

    let covariance = calibrator.estimated_covariance().unwrap();
    for &i in COMMON_AXIS_PARAMETERS.iter() {
        for j in 0..12 {
            assert_eq!(covariance[(i, j)], 0.0);
            assert_eq!(covariance[(j, i)], 0.0);
        }
    }
    assert!(covariance[(0, 0)] > 0.0);
}

#[test]
fn seeded_calibrations_are_deterministic() {
    let truth = true_accelerometer();
    let (measurements, flags) = accelerometer_dataset(&truth, 50, 0.2, 1e-3, 9);
    for method in RobustMethod::ALL {
        let mut calibrator = accelerometer_calibrator(measurements.clone(), seeded(method));
        if method.requires_quality_scores() {
            calibrator
                .set_quality_scores(Some(quality_scores(&flags)))
                .unwrap();
        }
        let first = calibrator.calibrate().unwrap();
        let second = calibrator.calibrate().unwrap();
        assert_eq!(first, second, "{method} is not deterministic");
    }
}

#[test]
fn refinement_never_worsens_the_fit() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 60, 0.2, 2e-3, 10);
    let estimator = KnownFrameEstimator::new(AccelerometerModel);

    for method in [RobustMethod::Ransac, RobustMethod::Msac, RobustMethod::Lmeds] {
        let unrefined_settings = CalibrationSettings {
            result_refined: false,
            ..seeded(method)
        };
        let unrefined = accelerometer_calibrator(measurements.clone(), unrefined_settings)
            .calibrate()
            .unwrap();
        let refined = accelerometer_calibrator(measurements.clone(), seeded(method))
            .calibrate()
            .unwrap();
        assert!(!unrefined.refined);
        assert!(refined.refined);

        let inliers = unrefined.inliers_data.inlier_indices();
        let cost = |model: &TriadCalibration| -> f64 {
            inliers
                .iter()
                .map(|&i| {
                    let r = estimator.residual(model, &measurements[i]);
                    r * r
                })
                .sum()
        };
        assert!(cost(&refined.model) <= cost(&unrefined.model), "{method}");
    }
}

#[test]
fn nonlinear_preliminary_solver_recovers_calibration() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 40, 0.2, 0.0, 12);
    let settings = CalibrationSettings {
        linear_calibrator_used: false,
        ..seeded(RobustMethod::Lmeds)
    };
    let result = calibrate_accelerometer(measurements, settings, None).unwrap();
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );
}

#[test]
fn preliminary_refinement_and_larger_subsets() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 60, 0.1, 0.0, 13);
    let settings = CalibrationSettings {
        preliminary_solution_refined: true,
        preliminary_subset_size: Some(6),
        ..seeded(RobustMethod::Msac)
    };
    let mut calibrator = accelerometer_calibrator(measurements, settings);
    assert_eq!(calibrator.subset_size(), 6);
    let result = calibrator.calibrate().unwrap();
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );
}

#[test]
fn readiness_errors_are_reported_at_calibrate() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 3, 0.0, 0.0, 14);
    let mut calibrator = accelerometer_calibrator(measurements, seeded(RobustMethod::Ransac));
    assert_eq!(calibrator.state(), CalibratorState::NotReady);
    let err = calibrator.calibrate().unwrap_err();
    assert_eq!(
        err,
        CalibrationError::NotEnoughMeasurements {
            required: 4,
            available: 3
        }
    );
    assert_eq!(err.kind(), ErrorKind::Readiness);
    assert!(calibrator.last_result().is_none());
}

struct FailingOptimizer;

impl LocalOptimizer<KnownFrameEstimator<AccelerometerModel>> for FailingOptimizer {
    fn run(
        &mut self,
        _estimator: &KnownFrameEstimator<AccelerometerModel>,
        _data: &[Measurement<SpecificForceSample>],
        _inliers: &[usize],
        _model: &TriadCalibration,
        _options: &FitOptions,
    ) -> Result<Option<TriadCalibration>, SolverError> {
        Err(SolverError::NotConverged { iterations: 0 })
    }
}

#[test]
fn refinement_failure_is_soft_unless_mandatory() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 30, 0.1, 0.0, 15);

    let mut calibrator = accelerometer_calibrator(measurements.clone(), seeded(RobustMethod::Lmeds));
    calibrator
        .set_local_optimizer(Box::new(FailingOptimizer))
        .unwrap();
    let result = calibrator.calibrate().unwrap();
    assert!(!result.refined);
    assert!(result.covariance.is_none());
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );

    calibrator.set_refinement_mandatory(true).unwrap();
    let err = calibrator.calibrate().unwrap_err();
    assert!(matches!(err, CalibrationError::RefinementFailed(_)));
    assert_eq!(err.kind(), ErrorKind::Algorithmic);
    assert!(!calibrator.is_running());
    assert!(calibrator.last_result().is_none());
}

#[derive(Default)]
struct Record {
    started: usize,
    ended: usize,
    iterations: Vec<usize>,
    progress: Vec<f64>,
    errors: Vec<CalibrationError>,
    running_seen: Vec<bool>,
}

struct RecordingListener(Rc<RefCell<Record>>);

impl CalibrationListener<KnownFrameEstimator<AccelerometerModel>> for RecordingListener {
    fn on_start(&mut self, calibrator: &mut AccelCalibrator<'_>) {
        let mut record = self.0.borrow_mut();
        record.started += 1;
        record.running_seen.push(calibrator.is_running());
        assert_eq!(calibrator.state(), CalibratorState::Running);
    }

    fn on_end(&mut self, calibrator: &mut AccelCalibrator<'_>) {
        let mut record = self.0.borrow_mut();
        record.ended += 1;
        record.running_seen.push(calibrator.is_running());
    }

    fn on_next_iteration(&mut self, calibrator: &mut AccelCalibrator<'_>, iteration: usize) {
        let mut record = self.0.borrow_mut();
        record.iterations.push(iteration);
        if let Err(e) = calibrator.set_threshold(0.5) {
            record.errors.push(e);
        }
        if let Err(e) = calibrator.set_measurements(Vec::new()) {
            record.errors.push(e);
        }
        if let Err(e) = calibrator.calibrate() {
            record.errors.push(e);
        }
    }

    fn on_progress_change(&mut self, _calibrator: &mut AccelCalibrator<'_>, progress: f64) {
        self.0.borrow_mut().progress.push(progress);
    }
}

#[test]
fn listener_observes_locked_calibrator() {
    let truth = true_accelerometer();
    let (measurements, _) = accelerometer_dataset(&truth, 40, 0.25, 1e-3, 16);
    let settings = CalibrationSettings {
        progress_delta: 0.0,
        ..seeded(RobustMethod::Ransac)
    };
    let record = Rc::new(RefCell::new(Record::default()));
    let mut listener = RecordingListener(record.clone());
    let mut calibrator = accelerometer_calibrator(measurements, settings.clone());
    calibrator.set_listener(Some(&mut listener)).unwrap();

    let result = calibrator.calibrate().unwrap();
    let record = record.borrow();

    assert_eq!(record.started, 1);
    assert_eq!(record.ended, 1);
    assert_eq!(record.running_seen, vec![true, false]);
    assert_eq!(record.iterations.len(), result.iterations);
    assert_eq!(record.iterations, (1..=result.iterations).collect::<Vec<_>>());
    assert_eq!(record.errors.len(), 3 * result.iterations);
    assert!(record.errors.iter().all(|e| *e == CalibrationError::Locked));
    assert!(record.errors.iter().all(|e| e.kind() == ErrorKind::Concurrency));
    assert!(record.progress.windows(2).all(|w| w[0] < w[1]));
    assert!(record.progress.iter().all(|&p| p > 0.0 && p <= 1.0));
    assert_eq!(record.progress.last(), Some(&1.0));

    // Nothing changed by the rejected calls.
    assert_eq!(calibrator.settings(), &settings);
    assert_eq!(calibrator.measurements().len(), 40);
    assert_eq!(calibrator.state(), CalibratorState::Ready);
}

/// Precise measurements with σ = 1e-3 and noisy ones with σ = 0.05.
///
/// Returns the same samples once with their σ and once without.
fn mixed_precision_dataset(
    truth: &TriadCalibration,
    seed: u64,
) -> (
    Vec<Measurement<SpecificForceSample>>,
    Vec<Measurement<SpecificForceSample>>,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut with_std_dev = Vec::new();
    let mut without_std_dev = Vec::new();
    for i in 0..60 {
        let f = 9.81 * random_direction(&mut rng);
        let mut measured = truth.distort(&f);
        let std_dev = if i % 3 == 0 {
            measured += 0.03 * random_direction(&mut rng);
            0.05
        } else {
            1e-3
        };
        let sample = SpecificForceSample::new(f, measured);
        with_std_dev.push(Measurement::with_std_dev(sample, std_dev));
        without_std_dev.push(Measurement::new(sample));
    }
    (with_std_dev, without_std_dev)
}

#[test]
fn std_dev_weights_pull_refinement_toward_precise_measurements() {
    let truth = true_accelerometer();
    let (weighted, unweighted) = mixed_precision_dataset(&truth, 21);
    let settings = CalibrationSettings {
        threshold: 0.2,
        ..seeded(RobustMethod::Ransac)
    };

    let weighted = calibrate_accelerometer(weighted, settings.clone(), None).unwrap();
    let unweighted = calibrate_accelerometer(unweighted, settings, None).unwrap();
    assert!(weighted.refined);
    assert!(unweighted.refined);

    let error = |model: &TriadCalibration| (model.to_parameters() - truth.to_parameters()).norm();
    assert!(error(&weighted.model) < 1e-4, "{}", error(&weighted.model));
    assert!(
        error(&weighted.model) * 100.0 < error(&unweighted.model),
        "weighted {} vs unweighted {}",
        error(&weighted.model),
        error(&unweighted.model)
    );
}

#[test]
fn tiny_std_dev_refinement_terminates() {
    let truth = true_accelerometer();
    let (measurements, flags) = accelerometer_dataset(&truth, 30, 0.1, 0.0, 1);
    let measurements: Vec<_> = measurements
        .into_iter()
        .map(|m| Measurement::with_std_dev(m.sample, 1e-200))
        .collect();
    let settings = CalibrationSettings {
        result_refined: true,
        ..seeded(RobustMethod::Ransac)
    };

    let result = calibrate_accelerometer(measurements, settings, None).unwrap();
    assert_relative_eq!(
        result.model.to_parameters(),
        truth.to_parameters(),
        epsilon = 1e-8
    );
    let detected: Vec<bool> = result.inliers_data.inliers.iter().map(|&i| !i).collect();
    assert_eq!(detected, flags);
}
