//! # Inlier-Calib - Robust Inertial Sensor Calibration
//!
//! `inlier-calib` estimates bias, scale and cross-coupling errors of
//! accelerometers, gyroscopes and magnetometers from batches of measurements
//! taken against a known reference, while rejecting outliers with RANSAC,
//! LMedS, MSAC, PROSAC or PROMedS.
//!
//! ## Quick Start
//!
//! ```rust
//! use inlier_calib::{calibrate_accelerometer, CalibrationSettings, RobustMethod};
//! use inlier_calib::models::TriadCalibration;
//! use inlier_calib::types::{Measurement, SpecificForceSample};
//! use nalgebra::Vector3;
//!
//! let truth = TriadCalibration::from_components(
//!     Vector3::new(0.05, -0.02, 0.1),
//!     Vector3::new(1e-3, 2e-3, -1e-3),
//!     0.0, 0.0, 1e-4, 0.0, -2e-4, 3e-4,
//! );
//! let measurements: Vec<_> = (0..20)
//!     .map(|i| {
//!         let a = i as f64 * 0.9;
//!         let f = 9.81 * Vector3::new(0.6 * a.cos(), 0.6 * a.sin(), 0.8 * (1.7 * a).cos());
//!         Measurement::new(SpecificForceSample::new(f, truth.distort(&f)))
//!     })
//!     .collect();
//!
//! let settings = CalibrationSettings {
//!     seed: Some(7),
//!     ..CalibrationSettings::with_method(RobustMethod::Msac)
//! };
//! let result = calibrate_accelerometer(measurements, settings, None).unwrap();
//! println!("bias: {:?}", result.model.bias);
//! ```
//!
//! ## Extending the Library
//!
//! The pipeline is built around a few traits:
//!
//! - **[`Estimator`](core::Estimator)**: fits models from measurement subsets and evaluates residuals
//! - **[`Sampler`](core::Sampler)**: draws measurement subsets
//! - **[`Scoring`](core::Scoring)**: scores candidates and classifies inliers
//! - **[`TerminationCriterion`](core::TerminationCriterion)**: adapts the iteration budget
//! - **[`LocalOptimizer`](optimisers::LocalOptimizer)**: refines candidates over their inliers
//! - **[`CalibrationListener`](core::CalibrationListener)**: observes a running calibration
//! - **[`SensorModel`](estimators::SensorModel)**: describes a sensor whose model is linear in its parameters
//!
//! ## Modules
//!
//! - **[`api`](api)**: one-call calibration functions
//! - **[`calibrator`](calibrator)**: the `RobustCalibrator` state machine
//! - **[`core`](core)**: core traits and the adaptive termination criterion
//! - **[`estimators`](estimators)**: accelerometer, gyroscope and magnetometer solvers
//! - **[`samplers`](samplers)**: uniform and PROSAC sampling
//! - **[`scoring`](scoring)**: RANSAC, MSAC and LMedS scoring
//! - **[`optimisers`](optimisers)**: refinement and covariance estimation
//! - **[`least_squares`](least_squares)**: linear and Levenberg-Marquardt solvers
//! - **[`settings`](settings)**: configuration of a calibration

pub mod api;
pub mod calibrator;
pub mod choices;
pub mod core;
pub mod error;
pub mod estimators;
pub mod least_squares;
pub mod models;
pub mod optimisers;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod utils;

// Re-export high-level API
pub use api::{calibrate_accelerometer, calibrate_gyroscope, calibrate_magnetometer};
pub use calibrator::{CalibratorState, EstimationResult, RobustCalibrator};

// Re-export core traits for easy access
pub use self::core::{CalibrationListener, Estimator, Sampler, Scoring, TerminationCriterion};
pub use error::{CalibrationError, ErrorKind, SolverError};

// Re-export settings for convenience
pub use settings::{CalibrationSettings, RobustMethod};
