//! Calibration parameter sets estimated by the robust calibrators.
//!
//! A triad sensor (accelerometer, magnetometer) is modelled as
//! `measured = b + (I + M) * expected`, where `M` carries the scale factors on
//! its diagonal and the cross-coupling errors off the diagonal:
//!
//! ```text
//!     | sx  mxy mxz |
//! M = | myx sy  myz |
//!     | mzx mzy sz  |
//! ```
//!
//! The flat parameter layout is
//! `[bx, by, bz, sx, sy, sz, mxy, mxz, myx, myz, mzx, mzy]`. The gyroscope adds
//! the g-dependent cross biases `Gg` (row-major) after the triad block.

use nalgebra::{DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Number of parameters of a triad calibration.
pub const TRIAD_PARAMETERS: usize = 12;

/// Number of parameters of a gyroscope calibration.
pub const GYROSCOPE_PARAMETERS: usize = TRIAD_PARAMETERS + 9;

/// Parameters forced to zero under the common-axis assumption (`mxy`, `mxz`, `myz`).
pub const COMMON_AXIS_PARAMETERS: [usize; 3] = [6, 7, 9];

/// Conversion between a calibration and its flat parameter vector.
pub trait CalibrationParameters: Clone + std::fmt::Debug {
    /// Length of the flat parameter vector.
    const LEN: usize;

    fn to_parameters(&self) -> DVector<f64>;

    /// Build from a vector of length [`Self::LEN`].
    fn from_parameters(params: &DVector<f64>) -> Self;
}

/// Bias and scale/cross-coupling of a three-axis sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriadCalibration {
    pub bias: Vector3<f64>,
    pub cross_coupling: Matrix3<f64>,
}

pub type AccelerometerCalibration = TriadCalibration;

/// Hard-iron bias and soft-iron matrix share the triad layout.
pub type MagnetometerCalibration = TriadCalibration;

impl Default for TriadCalibration {
    fn default() -> Self {
        Self {
            bias: Vector3::zeros(),
            cross_coupling: Matrix3::zeros(),
        }
    }
}

impl TriadCalibration {
    pub fn new(bias: Vector3<f64>, cross_coupling: Matrix3<f64>) -> Self {
        Self {
            bias,
            cross_coupling,
        }
    }

    /// Build from scale factors and the six cross-coupling terms.
    #[allow(clippy::too_many_arguments)]
    pub fn from_components(
        bias: Vector3<f64>,
        scale: Vector3<f64>,
        mxy: f64,
        mxz: f64,
        myx: f64,
        myz: f64,
        mzx: f64,
        mzy: f64,
    ) -> Self {
        #[rustfmt::skip]
        let cross_coupling = Matrix3::new(
            scale.x, mxy,     mxz,
            myx,     scale.y, myz,
            mzx,     mzy,     scale.z,
        );
        Self::new(bias, cross_coupling)
    }

    pub fn bias_array(&self) -> [f64; 3] {
        [self.bias.x, self.bias.y, self.bias.z]
    }

    pub fn scale_factors(&self) -> Vector3<f64> {
        self.cross_coupling.diagonal()
    }

    pub fn sx(&self) -> f64 {
        self.cross_coupling[(0, 0)]
    }

    pub fn sy(&self) -> f64 {
        self.cross_coupling[(1, 1)]
    }

    pub fn sz(&self) -> f64 {
        self.cross_coupling[(2, 2)]
    }

    pub fn mxy(&self) -> f64 {
        self.cross_coupling[(0, 1)]
    }

    pub fn mxz(&self) -> f64 {
        self.cross_coupling[(0, 2)]
    }

    pub fn myx(&self) -> f64 {
        self.cross_coupling[(1, 0)]
    }

    pub fn myz(&self) -> f64 {
        self.cross_coupling[(1, 2)]
    }

    pub fn mzx(&self) -> f64 {
        self.cross_coupling[(2, 0)]
    }

    pub fn mzy(&self) -> f64 {
        self.cross_coupling[(2, 1)]
    }

    /// Predicted raw output for a ground-truth input.
    pub fn distort(&self, expected: &Vector3<f64>) -> Vector3<f64> {
        self.bias + (Matrix3::identity() + self.cross_coupling) * expected
    }

    /// Recover the ground-truth input from a raw output, if `I + M` is invertible.
    pub fn correct(&self, measured: &Vector3<f64>) -> Option<Vector3<f64>> {
        let gain = Matrix3::identity() + self.cross_coupling;
        gain.try_inverse().map(|inv| inv * (measured - self.bias))
    }
}

impl CalibrationParameters for TriadCalibration {
    const LEN: usize = TRIAD_PARAMETERS;

    fn to_parameters(&self) -> DVector<f64> {
        let m = &self.cross_coupling;
        DVector::from_column_slice(&[
            self.bias.x,
            self.bias.y,
            self.bias.z,
            m[(0, 0)],
            m[(1, 1)],
            m[(2, 2)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
        ])
    }

    fn from_parameters(p: &DVector<f64>) -> Self {
        Self::from_components(
            Vector3::new(p[0], p[1], p[2]),
            Vector3::new(p[3], p[4], p[5]),
            p[6],
            p[7],
            p[8],
            p[9],
            p[10],
            p[11],
        )
    }
}

/// Gyroscope bias, scale/cross-coupling and g-dependent cross biases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroscopeCalibration {
    pub bias: Vector3<f64>,
    pub cross_coupling: Matrix3<f64>,
    pub g_dependent_cross_biases: Matrix3<f64>,
}

impl Default for GyroscopeCalibration {
    fn default() -> Self {
        Self {
            bias: Vector3::zeros(),
            cross_coupling: Matrix3::zeros(),
            g_dependent_cross_biases: Matrix3::zeros(),
        }
    }
}

impl GyroscopeCalibration {
    pub fn new(
        bias: Vector3<f64>,
        cross_coupling: Matrix3<f64>,
        g_dependent_cross_biases: Matrix3<f64>,
    ) -> Self {
        Self {
            bias,
            cross_coupling,
            g_dependent_cross_biases,
        }
    }

    /// Bias and cross-coupling viewed as a triad calibration.
    pub fn triad(&self) -> TriadCalibration {
        TriadCalibration::new(self.bias, self.cross_coupling)
    }

    pub fn bias_array(&self) -> [f64; 3] {
        [self.bias.x, self.bias.y, self.bias.z]
    }

    /// Predicted raw output for a ground-truth angular rate and specific force.
    pub fn distort(&self, angular_rate: &Vector3<f64>, specific_force: &Vector3<f64>) -> Vector3<f64> {
        self.bias
            + (Matrix3::identity() + self.cross_coupling) * angular_rate
            + self.g_dependent_cross_biases * specific_force
    }
}

impl CalibrationParameters for GyroscopeCalibration {
    const LEN: usize = GYROSCOPE_PARAMETERS;

    fn to_parameters(&self) -> DVector<f64> {
        let triad = self.triad().to_parameters();
        let gg = &self.g_dependent_cross_biases;
        let mut p = DVector::zeros(Self::LEN);
        p.rows_mut(0, TRIAD_PARAMETERS).copy_from(&triad);
        for r in 0..3 {
            for c in 0..3 {
                p[TRIAD_PARAMETERS + 3 * r + c] = gg[(r, c)];
            }
        }
        p
    }

    fn from_parameters(p: &DVector<f64>) -> Self {
        let triad = TriadCalibration::from_parameters(&p.rows(0, TRIAD_PARAMETERS).into_owned());
        let mut gg = Matrix3::zeros();
        for r in 0..3 {
            for c in 0..3 {
                gg[(r, c)] = p[TRIAD_PARAMETERS + 3 * r + c];
            }
        }
        Self::new(triad.bias, triad.cross_coupling, gg)
    }
}
