//! Magnetometer model against a known Earth magnetic field.

use nalgebra::{DMatrix, Vector3};

use super::{fill_triad_design, SensorModel};
use crate::models::{MagnetometerCalibration, TRIAD_PARAMETERS};
use crate::types::MagneticFluxSample;

/// `m_meas = b_hi + (I + M_si) m`: hard-iron bias and soft-iron matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagnetometerModel;

impl SensorModel for MagnetometerModel {
    type Sample = MagneticFluxSample;
    type Calibration = MagnetometerCalibration;

    fn design(&self, sample: &MagneticFluxSample) -> (DMatrix<f64>, Vector3<f64>) {
        let mut a = DMatrix::zeros(3, TRIAD_PARAMETERS);
        fill_triad_design(&mut a, &sample.expected);
        (a, sample.measured - sample.expected)
    }
}
