//! Measurement types shared by the calibrators.
//!
//! A measurement couples an opaque sensor sample with an optional standard
//! deviation. During refinement the standard deviation turns into a weight
//! `1 / σ²`; measurements without one get unit weight.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One sample of the pre-collected batch, plus its optional noise level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement<T> {
    pub sample: T,
    pub std_dev: Option<f64>,
}

impl<T> Measurement<T> {
    pub fn new(sample: T) -> Self {
        Self {
            sample,
            std_dev: None,
        }
    }

    pub fn with_std_dev(sample: T, std_dev: f64) -> Self {
        Self {
            sample,
            std_dev: Some(std_dev),
        }
    }

    /// σ used for weighting: the given one when positive and finite, one otherwise.
    pub fn effective_std_dev(&self) -> f64 {
        match self.std_dev {
            Some(s) if s > 0.0 && s.is_finite() => s,
            _ => 1.0,
        }
    }

}

/// Specific force sensed by an accelerometer against the value expected from a known frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecificForceSample {
    /// Ground-truth specific force (m/s²).
    pub expected: Vector3<f64>,
    /// Raw accelerometer output (m/s²).
    pub measured: Vector3<f64>,
}

impl SpecificForceSample {
    pub fn new(expected: Vector3<f64>, measured: Vector3<f64>) -> Self {
        Self { expected, measured }
    }
}

/// Angular rate sensed by a gyroscope against the known body kinematics.
///
/// The expected specific force is needed to model g-dependent cross biases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularRateSample {
    /// Ground-truth angular rate (rad/s).
    pub expected: Vector3<f64>,
    /// Ground-truth specific force at the same instant (m/s²).
    pub specific_force: Vector3<f64>,
    /// Raw gyroscope output (rad/s).
    pub measured: Vector3<f64>,
}

impl AngularRateSample {
    pub fn new(
        expected: Vector3<f64>,
        specific_force: Vector3<f64>,
        measured: Vector3<f64>,
    ) -> Self {
        Self {
            expected,
            specific_force,
            measured,
        }
    }
}

/// Magnetic flux density sensed by a magnetometer against the known local field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagneticFluxSample {
    /// Ground-truth flux density in body axes.
    pub expected: Vector3<f64>,
    /// Raw magnetometer output, in the same unit.
    pub measured: Vector3<f64>,
}

impl MagneticFluxSample {
    pub fn new(expected: Vector3<f64>, measured: Vector3<f64>) -> Self {
        Self { expected, measured }
    }
}
