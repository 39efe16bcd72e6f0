//! Error types for robust calibration.

use thiserror::Error;

/// Failure reported by a preliminary or refinement solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("need at least {required} measurements, got {available}")]
    NotEnoughData { required: usize, available: usize },
    #[error("degenerate measurement subset (rank {rank} < {unknowns})")]
    Degenerate { rank: usize, unknowns: usize },
    #[error("solver did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// Error category a [`CalibrationError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad option value, rejected eagerly by a setter.
    Configuration,
    /// Insufficient data detected when calibration starts.
    Readiness,
    /// Mutation or re-entry attempted while a calibration is running.
    Concurrency,
    /// No acceptable model could be produced.
    Algorithmic,
}

/// Errors returned by the robust calibrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("quality scores must have one entry per measurement: expected {expected}, got {actual}")]
    QualityScoresMismatch { expected: usize, actual: usize },
    #[error("not enough measurements: {required} required, {available} available")]
    NotEnoughMeasurements { required: usize, available: usize },
    #[error("the selected robust method requires quality scores")]
    MissingQualityScores,
    #[error("calibrator is locked while a calibration is running")]
    Locked,
    #[error("no valid candidate found after {iterations} iterations")]
    NotEnoughInliers { iterations: usize },
    #[error("refinement failed: {0}")]
    RefinementFailed(#[source] SolverError),
}

impl CalibrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::QualityScoresMismatch { .. } => {
                ErrorKind::Configuration
            }
            Self::NotEnoughMeasurements { .. } | Self::MissingQualityScores => ErrorKind::Readiness,
            Self::Locked => ErrorKind::Concurrency,
            Self::NotEnoughInliers { .. } | Self::RefinementFailed(_) => ErrorKind::Algorithmic,
        }
    }
}
