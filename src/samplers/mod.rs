//! Sampling strategies for the robust calibrators.
//!
//! - [`UniformRandomSampler`]: distinct indices drawn uniformly (RANSAC, LMedS, MSAC).
//! - [`ProsacSampler`]: quality-guided progressive sampling (PROSAC, PROMedS).

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;

use crate::error::CalibrationError;

/// Check that `sample_size` distinct indices can be drawn out of `point_count`.
pub(crate) fn check_sample_request(
    point_count: usize,
    sample_size: usize,
) -> Result<(), CalibrationError> {
    if sample_size == 0 {
        return Err(CalibrationError::InvalidConfiguration(
            "subset size must be positive".to_string(),
        ));
    }
    if point_count < sample_size {
        return Err(CalibrationError::NotEnoughMeasurements {
            required: sample_size,
            available: point_count,
        });
    }
    Ok(())
}
