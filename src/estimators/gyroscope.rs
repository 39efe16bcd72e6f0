//! Gyroscope model with g-dependent cross biases.

use nalgebra::{DMatrix, Vector3};

use super::{common_axis_mask, fill_triad_design, SensorModel};
use crate::models::{CalibrationParameters, GyroscopeCalibration, TRIAD_PARAMETERS};
use crate::types::AngularRateSample;

/// `ω_meas = bg + (I + Mg) ω + Gg f`.
///
/// When `g_dependent_cross_biases_estimated` is false, `Gg` is held at the
/// value of the estimator's initial guess.
#[derive(Debug, Clone, Copy)]
pub struct GyroscopeModel {
    pub g_dependent_cross_biases_estimated: bool,
}

impl Default for GyroscopeModel {
    fn default() -> Self {
        Self {
            g_dependent_cross_biases_estimated: true,
        }
    }
}

impl GyroscopeModel {
    pub fn new(g_dependent_cross_biases_estimated: bool) -> Self {
        Self {
            g_dependent_cross_biases_estimated,
        }
    }
}

impl SensorModel for GyroscopeModel {
    type Sample = AngularRateSample;
    type Calibration = GyroscopeCalibration;

    fn fixed_parameters(&self, common_axis_used: bool) -> Vec<bool> {
        let mut fixed = common_axis_mask(GyroscopeCalibration::LEN, common_axis_used);
        if !self.g_dependent_cross_biases_estimated {
            fixed[TRIAD_PARAMETERS..].iter_mut().for_each(|f| *f = true);
        }
        fixed
    }

    fn design(&self, sample: &AngularRateSample) -> (DMatrix<f64>, Vector3<f64>) {
        let mut a = DMatrix::zeros(3, GyroscopeCalibration::LEN);
        fill_triad_design(&mut a, &sample.expected);
        let f = &sample.specific_force;
        for row in 0..3 {
            for col in 0..3 {
                a[(row, TRIAD_PARAMETERS + 3 * row + col)] = f[col];
            }
        }
        (a, sample.measured - sample.expected)
    }
}
