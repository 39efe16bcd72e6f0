//! High-level Rust API for robust inertial sensor calibration.
//!
//! Each function builds a [`RobustCalibrator`] around the matching
//! known-frame estimator, runs it once and returns the result.

use crate::calibrator::{EstimationResult, RobustCalibrator};
use crate::core::Estimator;
use crate::error::CalibrationError;
use crate::estimators::{AccelerometerModel, GyroscopeModel, KnownFrameEstimator, MagnetometerModel};
use crate::models::{AccelerometerCalibration, GyroscopeCalibration, MagnetometerCalibration};
use crate::settings::CalibrationSettings;
use crate::types::{AngularRateSample, MagneticFluxSample, Measurement, SpecificForceSample};

fn run<E: Estimator>(
    estimator: E,
    measurements: Vec<Measurement<E::Sample>>,
    settings: CalibrationSettings,
    quality_scores: Option<Vec<f64>>,
) -> Result<EstimationResult<E::Model>, CalibrationError> {
    let mut calibrator = RobustCalibrator::with_settings(estimator, settings)?;
    calibrator.set_measurements(measurements)?;
    calibrator.set_quality_scores(quality_scores)?;
    calibrator.calibrate()
}

/// Estimate accelerometer bias and scale/cross-coupling.
///
/// # Arguments
/// * `measurements` - Expected and measured specific forces
/// * `settings` - Robust method and options
/// * `quality_scores` - One score per measurement, required by PROSAC and PROMedS
pub fn calibrate_accelerometer(
    measurements: Vec<Measurement<SpecificForceSample>>,
    settings: CalibrationSettings,
    quality_scores: Option<Vec<f64>>,
) -> Result<EstimationResult<AccelerometerCalibration>, CalibrationError> {
    run(
        KnownFrameEstimator::new(AccelerometerModel),
        measurements,
        settings,
        quality_scores,
    )
}

/// Estimate gyroscope bias, scale/cross-coupling and g-dependent cross biases.
pub fn calibrate_gyroscope(
    measurements: Vec<Measurement<AngularRateSample>>,
    settings: CalibrationSettings,
    quality_scores: Option<Vec<f64>>,
) -> Result<EstimationResult<GyroscopeCalibration>, CalibrationError> {
    run(
        KnownFrameEstimator::new(GyroscopeModel::default()),
        measurements,
        settings,
        quality_scores,
    )
}

/// Estimate magnetometer hard-iron bias and soft-iron matrix.
pub fn calibrate_magnetometer(
    measurements: Vec<Measurement<MagneticFluxSample>>,
    settings: CalibrationSettings,
    quality_scores: Option<Vec<f64>>,
) -> Result<EstimationResult<MagnetometerCalibration>, CalibrationError> {
    run(
        KnownFrameEstimator::new(MagnetometerModel),
        measurements,
        settings,
        quality_scores,
    )
}
