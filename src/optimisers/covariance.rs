//! Parameter covariance from the linearized residuals.

use nalgebra::DMatrix;

use super::relative_weights;
use crate::core::{Estimator, FitOptions};
use crate::types::Measurement;

/// Covariance `(Σ wᵢ Jᵢᵀ Jᵢ)⁻¹` of `model` over `inliers`, with `wᵢ = 1 / σᵢ²`.
///
/// Only free parameters enter the normal matrix; rows and columns of
/// parameters fixed under `options` are exactly zero. Returns `None` when the
/// normal matrix is singular.
pub fn estimate_covariance<E: Estimator>(
    estimator: &E,
    data: &[Measurement<E::Sample>],
    inliers: &[usize],
    model: &E::Model,
    options: &FitOptions,
) -> Option<DMatrix<f64>> {
    let p = estimator.parameter_count();
    let fixed = estimator.fixed_parameters(options);
    let free: Vec<usize> = (0..p).filter(|&i| !fixed[i]).collect();
    let n = free.len();
    if n == 0 {
        return Some(DMatrix::zeros(p, p));
    }

    // Relative weights keep the normal matrix finite; σ_min² restores the scale.
    let weights = relative_weights(data, inliers);
    let smallest = inliers
        .iter()
        .map(|&i| data[i].effective_std_dev())
        .fold(f64::INFINITY, f64::min);
    let mut information = DMatrix::<f64>::zeros(n, n);
    for (&i, w) in inliers.iter().zip(&weights) {
        let jacobian = estimator
            .jacobian(model, &data[i])
            .select_columns(free.iter());
        information += *w * jacobian.tr_mul(&jacobian);
    }

    let reduced = information.cholesky()?.inverse() * (smallest * smallest);
    if reduced.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut covariance = DMatrix::zeros(p, p);
    for (r, &row) in free.iter().enumerate() {
        for (c, &col) in free.iter().enumerate() {
            covariance[(row, col)] = reduced[(r, c)];
        }
    }
    Some(covariance)
}
