//! Least-squares solvers used by the preliminary and refinement steps.
//!
//! - [`solve_weighted_linear`]: closed-form weighted linear least squares
//!   through an SVD, rejecting rank-deficient systems.
//! - [`levenberg_marquardt`]: iterative solve of any problem exposing its
//!   residual vector and Jacobian through the `argmin` operator traits,
//!   driven by the `levenberg_marquardt` crate over the free parameters.
//!
//! [`LinearResiduals`] adapts a stacked system `A θ - b` to those traits.

use argmin::core::{Error, Jacobian, Operator};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::trace;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use crate::error::SolverError;

/// Reject weights the row scaling cannot represent.
fn check_weights(weights: &DVector<f64>, rows: usize) -> Result<(), SolverError> {
    if weights.len() != rows {
        return Err(SolverError::Numerical(format!(
            "expected {rows} row weights, got {}",
            weights.len()
        )));
    }
    if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(SolverError::Numerical(format!(
            "row weights must be finite and non-negative, got {bad}"
        )));
    }
    Ok(())
}

/// Scale every row of `a` and `b` by the square root of its weight.
fn scale_rows(a: &mut DMatrix<f64>, b: &mut DVector<f64>, weights: &DVector<f64>) {
    for (i, w) in weights.iter().enumerate() {
        let s = w.sqrt();
        a.row_mut(i).scale_mut(s);
        b[i] *= s;
    }
}

/// Solve `min Σ wᵢ (aᵢ·x - bᵢ)²` for `x`.
///
/// `weights`, when given, has one finite non-negative entry per row of `a`.
/// Fails when there are fewer rows than unknowns, when the weighted system
/// holds non-finite values or when it is rank deficient.
pub fn solve_weighted_linear(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    weights: Option<&DVector<f64>>,
) -> Result<DVector<f64>, SolverError> {
    let (rows, cols) = a.shape();
    if rows < cols {
        return Err(SolverError::NotEnoughData {
            required: cols,
            available: rows,
        });
    }

    let mut a_w = a.clone();
    let mut b_w = b.clone();
    if let Some(w) = weights {
        check_weights(w, rows)?;
        scale_rows(&mut a_w, &mut b_w, w);
    }
    // The SVD iterates without bound on NaN input.
    if a_w.iter().chain(b_w.iter()).any(|v| !v.is_finite()) {
        return Err(SolverError::Numerical(
            "weighted system holds non-finite values".to_string(),
        ));
    }

    let svd = a_w.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let tol = rows.max(cols) as f64 * f64::EPSILON * sigma_max;
    let rank = svd.rank(tol);
    if rank < cols {
        return Err(SolverError::Degenerate {
            rank,
            unknowns: cols,
        });
    }

    svd.solve(&b_w, tol)
        .map_err(|e| SolverError::Numerical(e.to_string()))
}

/// Stacked linear residuals `sqrt(w) ⊙ (A θ - b)`.
#[derive(Debug, Clone)]
pub struct LinearResiduals {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

impl LinearResiduals {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Self {
        Self { a, b }
    }

    /// Scale every row by the square root of its weight.
    pub fn weighted(
        mut a: DMatrix<f64>,
        mut b: DVector<f64>,
        weights: &DVector<f64>,
    ) -> Result<Self, SolverError> {
        check_weights(weights, a.nrows())?;
        scale_rows(&mut a, &mut b, weights);
        Ok(Self { a, b })
    }
}

impl Operator for LinearResiduals {
    type Param = DVector<f64>;
    type Output = DVector<f64>;

    fn apply(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(&self.a * param - &self.b)
    }
}

impl Jacobian for LinearResiduals {
    type Param = DVector<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, _param: &Self::Param) -> Result<Self::Jacobian, Error> {
        Ok(self.a.clone())
    }
}

/// View of a residual problem restricted to its free parameters.
struct FreeParameters<'a, P> {
    problem: &'a P,
    full: DVector<f64>,
    free_columns: Vec<usize>,
}

impl<P> LeastSquaresProblem<f64, Dyn, Dyn> for FreeParameters<'_, P>
where
    P: Operator<Param = DVector<f64>, Output = DVector<f64>>
        + Jacobian<Param = DVector<f64>, Jacobian = DMatrix<f64>>,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (k, &col) in self.free_columns.iter().enumerate() {
            self.full[col] = x[k];
        }
    }

    fn params(&self) -> DVector<f64> {
        self.full.select_rows(self.free_columns.iter())
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.problem.apply(&self.full).ok()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.problem
            .jacobian(&self.full)
            .ok()
            .map(|j| j.select_columns(self.free_columns.iter()))
    }
}

/// Function evaluations allowed per free parameter.
const PATIENCE: usize = 200;

/// Minimise `½‖r(θ)‖²` starting from `initial`.
///
/// Only entries with `free[i] == true` are updated; the others keep their
/// initial value.
pub fn levenberg_marquardt<P>(
    problem: &P,
    initial: DVector<f64>,
    free: &[bool],
) -> Result<DVector<f64>, SolverError>
where
    P: Operator<Param = DVector<f64>, Output = DVector<f64>>
        + Jacobian<Param = DVector<f64>, Jacobian = DMatrix<f64>>,
{
    let free_columns: Vec<usize> = free
        .iter()
        .enumerate()
        .filter_map(|(i, &f)| f.then_some(i))
        .collect();
    let n = free_columns.len();
    if n == 0 {
        return Ok(initial);
    }
    let rows = problem.apply(&initial).map_err(numerical)?.len();
    if rows < n {
        return Err(SolverError::NotEnoughData {
            required: n,
            available: rows,
        });
    }

    let wrapper = FreeParameters {
        problem,
        full: initial,
        free_columns,
    };
    let (wrapper, report) = LevenbergMarquardt::new()
        .with_patience(PATIENCE)
        .minimize(wrapper);

    if report.termination.was_successful() {
        trace!(
            "levenberg-marquardt finished after {} evaluations ({:?})",
            report.number_of_evaluations,
            report.termination
        );
        return Ok(wrapper.full);
    }
    match report.termination {
        TerminationReason::LostPatience => Err(SolverError::NotConverged {
            iterations: report.number_of_evaluations,
        }),
        reason => Err(SolverError::Numerical(format!(
            "levenberg-marquardt stopped: {reason:?}"
        ))),
    }
}

fn numerical(err: Error) -> SolverError {
    SolverError::Numerical(err.to_string())
}
