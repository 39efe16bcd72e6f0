//! Configuration types for the robust calibrators.
//!
//! All options live in one [`CalibrationSettings`] value with named, defaulted
//! fields. Settings deserialize from partial documents thanks to
//! `#[serde(default)]`, and are validated once through
//! [`CalibrationSettings::validate`].

use serde::{Deserialize, Serialize};

use crate::core::FitOptions;
use crate::error::CalibrationError;

/// Robust estimation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustMethod {
    /// Uniform sampling, inlier counting.
    Ransac,
    /// Uniform sampling, least median of squares.
    #[default]
    Lmeds,
    /// Uniform sampling, truncated quadratic cost.
    Msac,
    /// Quality-guided progressive sampling, inlier counting.
    Prosac,
    /// Quality-guided progressive sampling, least median of squares.
    Promeds,
}

impl RobustMethod {
    pub const ALL: [RobustMethod; 5] = [
        RobustMethod::Ransac,
        RobustMethod::Lmeds,
        RobustMethod::Msac,
        RobustMethod::Prosac,
        RobustMethod::Promeds,
    ];

    /// Whether the method needs one quality score per measurement.
    pub fn requires_quality_scores(self) -> bool {
        matches!(self, RobustMethod::Prosac | RobustMethod::Promeds)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ransac => "RANSAC",
            Self::Lmeds => "LMedS",
            Self::Msac => "MSAC",
            Self::Prosac => "PROSAC",
            Self::Promeds => "PROMedS",
        }
    }
}

impl std::fmt::Display for RobustMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Main configuration object for a robust calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub method: RobustMethod,
    /// Residual threshold separating inliers from outliers.
    pub threshold: f64,
    /// Score level at which the search may stop early.
    pub stop_threshold: f64,
    /// Desired probability of drawing at least one all-inlier subset, in (0, 1).
    pub confidence: f64,
    /// Hard cap on the number of iterations.
    pub max_iterations: usize,
    /// Minimum progress increase between two progress notifications, in \[0, 1\].
    pub progress_delta: f64,
    /// Force `mxy`, `mxz` and `myz` to zero.
    pub common_axis_used: bool,
    /// Linear (SVD) preliminary solver when `true`, Levenberg-Marquardt otherwise.
    pub linear_calibrator_used: bool,
    /// Refine every preliminary candidate over its own inliers.
    pub preliminary_solution_refined: bool,
    /// Refine the best candidate over its inliers at the end.
    pub result_refined: bool,
    /// Fail the calibration when the final refinement fails.
    pub refinement_mandatory: bool,
    /// Estimate the parameter covariance of the final solution.
    pub covariance_kept: bool,
    /// Subset size drawn per iteration; `None` uses the problem minimum.
    pub preliminary_subset_size: Option<usize>,
    /// PROSAC iterations before falling back to uniform sampling.
    pub prosac_convergence_iterations: usize,
    /// Sampler seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            method: RobustMethod::Lmeds,
            threshold: 1e-2,
            stop_threshold: 1e-3,
            confidence: 0.99,
            max_iterations: 5000,
            progress_delta: 0.05,
            common_axis_used: false,
            linear_calibrator_used: true,
            preliminary_solution_refined: false,
            result_refined: true,
            refinement_mandatory: false,
            covariance_kept: true,
            preliminary_subset_size: None,
            prosac_convergence_iterations: 100_000,
            seed: None,
        }
    }
}

impl CalibrationSettings {
    pub fn with_method(method: RobustMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Options forwarded to the preliminary and refinement solvers.
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            common_axis_used: self.common_axis_used,
            linear_solver_used: self.linear_calibrator_used,
        }
    }

    /// Check every field that does not depend on the estimator.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(invalid(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        if !(self.stop_threshold > 0.0 && self.stop_threshold.is_finite()) {
            return Err(invalid(format!(
                "stop threshold must be positive, got {}",
                self.stop_threshold
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(invalid(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max iterations must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.progress_delta) {
            return Err(invalid(format!(
                "progress delta must lie in [0, 1], got {}",
                self.progress_delta
            )));
        }
        if self.prosac_convergence_iterations == 0 {
            return Err(invalid(
                "PROSAC convergence iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> CalibrationError {
    CalibrationError::InvalidConfiguration(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_settings_are_valid() {
        let cfg = CalibrationSettings::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.method, RobustMethod::Lmeds);
        assert_eq!(cfg.max_iterations, 5000);
        assert!((cfg.confidence - 0.99).abs() < 1e-12);
        assert!(cfg.result_refined);
        assert!(cfg.covariance_kept);
        assert!(cfg.preliminary_subset_size.is_none());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            CalibrationSettings {
                threshold: 0.0,
                ..Default::default()
            },
            CalibrationSettings {
                stop_threshold: -1.0,
                ..Default::default()
            },
            CalibrationSettings {
                confidence: 1.0,
                ..Default::default()
            },
            CalibrationSettings {
                confidence: 0.0,
                ..Default::default()
            },
            CalibrationSettings {
                max_iterations: 0,
                ..Default::default()
            },
            CalibrationSettings {
                progress_delta: 1.5,
                ..Default::default()
            },
        ];
        for cfg in cases {
            let err = cfg.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{cfg:?}");
        }
    }

    #[test]
    fn only_progressive_methods_need_quality_scores() {
        let needing: Vec<_> = RobustMethod::ALL
            .iter()
            .filter(|m| m.requires_quality_scores())
            .collect();
        assert_eq!(needing, vec![&RobustMethod::Prosac, &RobustMethod::Promeds]);
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        use serde::de::value::{Error, MapDeserializer};

        let iterations = MapDeserializer::<_, Error>::new([("max_iterations", 200usize)].into_iter());
        let cfg = CalibrationSettings::deserialize(iterations).unwrap();
        assert_eq!(cfg.max_iterations, 200);
        assert_eq!(cfg.method, RobustMethod::Lmeds);

        let method = MapDeserializer::<_, Error>::new([("method", "promeds")].into_iter());
        let cfg = CalibrationSettings::deserialize(method).unwrap();
        assert_eq!(cfg.method, RobustMethod::Promeds);
        assert_eq!(cfg.threshold, CalibrationSettings::default().threshold);
    }

    #[test]
    fn fit_options_follow_flags() {
        let cfg = CalibrationSettings {
            common_axis_used: true,
            linear_calibrator_used: false,
            ..Default::default()
        };
        let opts = cfg.fit_options();
        assert!(opts.common_axis_used);
        assert!(!opts.linear_solver_used);
    }
}
