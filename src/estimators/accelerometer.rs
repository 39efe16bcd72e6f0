//! Accelerometer model against a known frame.

use nalgebra::{DMatrix, Vector3};

use super::{fill_triad_design, SensorModel};
use crate::models::{AccelerometerCalibration, TRIAD_PARAMETERS};
use crate::types::SpecificForceSample;

/// `f_meas = b + (I + M) f`, with `f` the specific force of the known frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccelerometerModel;

impl SensorModel for AccelerometerModel {
    type Sample = SpecificForceSample;
    type Calibration = AccelerometerCalibration;

    fn design(&self, sample: &SpecificForceSample) -> (DMatrix<f64>, Vector3<f64>) {
        let mut a = DMatrix::zeros(3, TRIAD_PARAMETERS);
        fill_triad_design(&mut a, &sample.expected);
        (a, sample.measured - sample.expected)
    }
}
