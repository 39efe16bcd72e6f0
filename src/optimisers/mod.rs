use crate::core::{Estimator, FitOptions};
use crate::error::SolverError;
use crate::types::Measurement;

/// Local optimization strategy refining a model over its inliers.
///
/// The calibrator runs it on every preliminary candidate when
/// `preliminary_solution_refined` is set, and on the best candidate when
/// `result_refined` is set. `Ok(None)` means the model was kept as is.
///
/// ## Example: custom refinement
///
/// ```rust
/// use inlier_calib::core::{Estimator, FitOptions};
/// use inlier_calib::error::SolverError;
/// use inlier_calib::optimisers::LocalOptimizer;
/// use inlier_calib::types::Measurement;
///
/// /// Refits from the first inliers only.
/// struct HeadRefit(usize);
///
/// impl<E: Estimator> LocalOptimizer<E> for HeadRefit {
///     fn run(
///         &mut self,
///         estimator: &E,
///         data: &[Measurement<E::Sample>],
///         inliers: &[usize],
///         _model: &E::Model,
///         options: &FitOptions,
///     ) -> Result<Option<E::Model>, SolverError> {
///         let head = &inliers[..inliers.len().min(self.0)];
///         estimator.estimate_model(data, head, None, options).map(Some)
///     }
/// }
/// ```
pub trait LocalOptimizer<E: Estimator> {
    /// Refine `model` using the measurements at `inliers`.
    fn run(
        &mut self,
        estimator: &E,
        data: &[Measurement<E::Sample>],
        inliers: &[usize],
        model: &E::Model,
        options: &FitOptions,
    ) -> Result<Option<E::Model>, SolverError>;
}

/// Local optimizer that always keeps the model.
pub struct NoopLocalOptimizer;

impl<E: Estimator> LocalOptimizer<E> for NoopLocalOptimizer {
    fn run(
        &mut self,
        _estimator: &E,
        _data: &[Measurement<E::Sample>],
        _inliers: &[usize],
        _model: &E::Model,
        _options: &FitOptions,
    ) -> Result<Option<E::Model>, SolverError> {
        Ok(None)
    }
}

pub mod covariance;
pub mod local;

pub use covariance::estimate_covariance;
pub use local::{relative_weights, WeightedLeastSquaresOptimizer};
