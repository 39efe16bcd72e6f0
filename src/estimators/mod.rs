//! Preliminary solvers for inertial sensor calibration.
//!
//! Every sensor handled here has a measurement model that is linear in its
//! calibration parameters once the ground-truth input is known:
//! `measured - expected = A(sample) θ`. A [`SensorModel`] only describes that
//! design row block; [`KnownFrameEstimator`] turns it into an
//! [`Estimator`](crate::core::Estimator) usable by the robust calibrator.
//!
//! - [`AccelerometerModel`]: `f_meas = b + (I + M) f`
//! - [`GyroscopeModel`]: `ω_meas = bg + (I + Mg) ω + Gg f`
//! - [`MagnetometerModel`]: `m_meas = b_hi + (I + M_si) m`

pub mod accelerometer;
pub mod gyroscope;
pub mod known_frame;
pub mod magnetometer;

pub use accelerometer::AccelerometerModel;
pub use gyroscope::GyroscopeModel;
pub use known_frame::KnownFrameEstimator;
pub use magnetometer::MagnetometerModel;

use nalgebra::{DMatrix, Vector3};

use crate::models::{CalibrationParameters, COMMON_AXIS_PARAMETERS, TRIAD_PARAMETERS};

/// Measurement model of a sensor, linear in its calibration parameters.
pub trait SensorModel {
    type Sample;
    type Calibration: CalibrationParameters;

    /// Mask of parameters that are not estimated (`true` = fixed).
    fn fixed_parameters(&self, common_axis_used: bool) -> Vec<bool> {
        common_axis_mask(Self::Calibration::LEN, common_axis_used)
    }

    /// Design block `A` (3 × LEN) and observation `y` of one sample, such
    /// that a perfect calibration `θ` satisfies `y = A θ`.
    fn design(&self, sample: &Self::Sample) -> (DMatrix<f64>, Vector3<f64>);
}

/// Fixed-parameter mask of length `len` marking the common-axis terms.
pub(crate) fn common_axis_mask(len: usize, common_axis_used: bool) -> Vec<bool> {
    let mut fixed = vec![false; len];
    if common_axis_used {
        for &i in COMMON_AXIS_PARAMETERS.iter() {
            fixed[i] = true;
        }
    }
    fixed
}

/// Write the triad columns for input `u` into the first 12 columns of `a`.
pub(crate) fn fill_triad_design(a: &mut DMatrix<f64>, u: &Vector3<f64>) {
    debug_assert!(a.nrows() == 3 && a.ncols() >= TRIAD_PARAMETERS);
    for axis in 0..3 {
        a[(axis, axis)] = 1.0;
        a[(axis, 3 + axis)] = u[axis];
    }
    // mxy, mxz, myx, myz, mzx, mzy
    a[(0, 6)] = u.y;
    a[(0, 7)] = u.z;
    a[(1, 8)] = u.x;
    a[(1, 9)] = u.z;
    a[(2, 10)] = u.x;
    a[(2, 11)] = u.y;
}
