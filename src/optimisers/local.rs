use log::trace;

use crate::core::{Estimator, FitOptions};
use crate::error::SolverError;
use crate::types::Measurement;

/// Weighted least-squares refit over all inliers.
///
/// Each measurement is weighted by `1 / σ²` (unit weight when unknown). The
/// refit is only kept when its weighted cost over the inliers does not exceed
/// the cost of the model it started from.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedLeastSquaresOptimizer;

/// Weights proportional to `1 / σᵢ²` of `inliers`, the most precise one at one.
///
/// Built from ratios of standard deviations, so tiny σ cannot overflow.
pub fn relative_weights<T>(data: &[Measurement<T>], inliers: &[usize]) -> Vec<f64> {
    let sigmas: Vec<f64> = inliers
        .iter()
        .map(|&i| data[i].effective_std_dev())
        .collect();
    let smallest = sigmas.iter().copied().fold(f64::INFINITY, f64::min);
    sigmas.iter().map(|s| (smallest / s).powi(2)).collect()
}

/// `Σ wᵢ rᵢ²` of `model` over `inliers`.
pub fn weighted_cost<E: Estimator>(
    estimator: &E,
    data: &[Measurement<E::Sample>],
    inliers: &[usize],
    weights: &[f64],
    model: &E::Model,
) -> f64 {
    inliers
        .iter()
        .zip(weights)
        .map(|(&i, w)| {
            let r = estimator.residual(model, &data[i]);
            w * r * r
        })
        .sum()
}

impl<E: Estimator> super::LocalOptimizer<E> for WeightedLeastSquaresOptimizer {
    fn run(
        &mut self,
        estimator: &E,
        data: &[Measurement<E::Sample>],
        inliers: &[usize],
        model: &E::Model,
        options: &FitOptions,
    ) -> Result<Option<E::Model>, SolverError> {
        let weights = relative_weights(data, inliers);
        let refined = estimator.estimate_model(data, inliers, Some(&weights), options)?;

        let before = weighted_cost(estimator, data, inliers, &weights, model);
        let after = weighted_cost(estimator, data, inliers, &weights, &refined);
        if after.is_finite() && after <= before {
            Ok(Some(refined))
        } else {
            trace!("refit cost {after:e} exceeds {before:e}, keeping candidate");
            Ok(None)
        }
    }
}
