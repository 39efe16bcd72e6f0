//! Generic preliminary solver for sensors with a known ground truth.

use nalgebra::{DMatrix, DVector};

use super::SensorModel;
use crate::core::{Estimator, FitOptions};
use crate::error::SolverError;
use crate::least_squares::{levenberg_marquardt, solve_weighted_linear, LinearResiduals};
use crate::models::CalibrationParameters;
use crate::types::Measurement;

/// Fits a [`SensorModel`] from any subset of measurements.
///
/// Fixed parameters take their value from `initial_guess`, except the
/// common-axis terms which are always zero when the option is set. The
/// nonlinear solver also starts from the initial guess.
#[derive(Debug, Clone)]
pub struct KnownFrameEstimator<S: SensorModel> {
    model: S,
    initial_guess: S::Calibration,
}

impl<S> KnownFrameEstimator<S>
where
    S: SensorModel,
    S::Calibration: Default,
{
    pub fn new(model: S) -> Self {
        Self::with_initial_guess(model, S::Calibration::default())
    }
}

impl<S: SensorModel> KnownFrameEstimator<S> {
    pub fn with_initial_guess(model: S, initial_guess: S::Calibration) -> Self {
        Self {
            model,
            initial_guess,
        }
    }

    pub fn model(&self) -> &S {
        &self.model
    }

    pub fn initial_guess(&self) -> &S::Calibration {
        &self.initial_guess
    }

    pub fn set_initial_guess(&mut self, initial_guess: S::Calibration) {
        self.initial_guess = initial_guess;
    }

    /// Initial guess with the fixed common-axis terms forced to zero.
    fn starting_parameters(&self, fixed: &[bool], options: &FitOptions) -> DVector<f64> {
        let mut params = self.initial_guess.to_parameters();
        if options.common_axis_used {
            for &i in crate::models::COMMON_AXIS_PARAMETERS.iter() {
                if fixed[i] {
                    params[i] = 0.0;
                }
            }
        }
        params
    }

    /// Stack the design blocks of `indices` into one system.
    fn stack(
        &self,
        data: &[Measurement<S::Sample>],
        indices: &[usize],
    ) -> (DMatrix<f64>, DVector<f64>) {
        let p = S::Calibration::LEN;
        let mut a = DMatrix::zeros(3 * indices.len(), p);
        let mut b = DVector::zeros(3 * indices.len());
        for (k, &idx) in indices.iter().enumerate() {
            let (block, y) = self.model.design(&data[idx].sample);
            a.view_mut((3 * k, 0), (3, p)).copy_from(&block);
            b.rows_mut(3 * k, 3).copy_from(&y);
        }
        (a, b)
    }
}

fn row_weights(weights: Option<&[f64]>, count: usize) -> Option<DVector<f64>> {
    weights.map(|w| DVector::from_fn(3 * count, |r, _| w[r / 3]))
}

impl<S: SensorModel> Estimator for KnownFrameEstimator<S> {
    type Sample = S::Sample;
    type Model = S::Calibration;

    fn parameter_count(&self) -> usize {
        S::Calibration::LEN
    }

    fn sample_size(&self, options: &FitOptions) -> usize {
        let free = self
            .fixed_parameters(options)
            .iter()
            .filter(|&&f| !f)
            .count();
        free.div_ceil(3).max(1)
    }

    fn fixed_parameters(&self, options: &FitOptions) -> Vec<bool> {
        self.model.fixed_parameters(options.common_axis_used)
    }

    fn estimate_model(
        &self,
        data: &[Measurement<S::Sample>],
        indices: &[usize],
        weights: Option<&[f64]>,
        options: &FitOptions,
    ) -> Result<S::Calibration, SolverError> {
        let required = self.sample_size(options);
        if indices.len() < required {
            return Err(SolverError::NotEnoughData {
                required,
                available: indices.len(),
            });
        }
        if let Some(w) = weights {
            if w.len() != indices.len() {
                return Err(SolverError::Numerical(format!(
                    "expected {} weights, got {}",
                    indices.len(),
                    w.len()
                )));
            }
        }

        let fixed = self.fixed_parameters(options);
        let mut params = self.starting_parameters(&fixed, options);
        let (a, b) = self.stack(data, indices);
        let row_weights = row_weights(weights, indices.len());

        if options.linear_solver_used {
            let free_columns: Vec<usize> = (0..fixed.len()).filter(|&i| !fixed[i]).collect();
            let fixed_columns: Vec<usize> = (0..fixed.len()).filter(|&i| fixed[i]).collect();
            let a_free = a.select_columns(free_columns.iter());
            let mut rhs = b;
            if !fixed_columns.is_empty() {
                let a_fixed = a.select_columns(fixed_columns.iter());
                let theta_fixed = params.select_rows(fixed_columns.iter());
                rhs -= a_fixed * theta_fixed;
            }
            let solution = solve_weighted_linear(&a_free, &rhs, row_weights.as_ref())?;
            for (k, &col) in free_columns.iter().enumerate() {
                params[col] = solution[k];
            }
        } else {
            let problem = match row_weights {
                Some(w) => LinearResiduals::weighted(a, b, &w)?,
                None => LinearResiduals::new(a, b),
            };
            let free: Vec<bool> = fixed.iter().map(|f| !f).collect();
            params = levenberg_marquardt(&problem, params, &free)?;
        }

        if params.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::Numerical(
                "non-finite calibration parameters".to_string(),
            ));
        }
        Ok(S::Calibration::from_parameters(&params))
    }

    fn residual(&self, model: &S::Calibration, measurement: &Measurement<S::Sample>) -> f64 {
        let (a, y) = self.model.design(&measurement.sample);
        let predicted = a * model.to_parameters();
        (0..3)
            .map(|i| (y[i] - predicted[i]).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn jacobian(
        &self,
        _model: &S::Calibration,
        measurement: &Measurement<S::Sample>,
    ) -> DMatrix<f64> {
        self.model.design(&measurement.sample).0
    }
}
