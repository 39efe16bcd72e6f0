//! Scoring primitives for the robust calibrators.
//!
//! Every scorer maps the residuals of a candidate to a [`Score`] where smaller
//! is better, together with the inlier classification obtained from the
//! configured threshold:
//! - [`RansacScoring`]: negated inlier count.
//! - [`MsacScoring`]: sum of squared residuals truncated at `threshold²`.
//! - [`LmedsScoring`]: median of squared residuals.

use serde::{Deserialize, Serialize};

use crate::core::Scoring;
use crate::utils::median_in_place;

/// Scalar score, smaller is better. Ties are broken by the inlier count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub inlier_count: usize,
}

impl Score {
    pub fn new(value: f64, inlier_count: usize) -> Self {
        Self {
            value,
            inlier_count,
        }
    }

    /// Worst possible score, used before any candidate is accepted.
    pub fn worst() -> Self {
        Self::new(f64::INFINITY, 0)
    }

    pub fn is_better_than(&self, other: &Score) -> bool {
        if self.value.is_nan() {
            return false;
        }
        self.value < other.value
            || (self.value == other.value && self.inlier_count > other.inlier_count)
    }
}

/// Per-candidate evaluation: inlier bitmap, residuals and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InliersData {
    pub inliers: Vec<bool>,
    pub residuals: Vec<f64>,
    pub inlier_count: usize,
    pub score: Score,
}

impl InliersData {
    /// Classify `residuals` against `threshold` and attach `score_value`.
    pub fn classify(residuals: Vec<f64>, threshold: f64, score_value: f64) -> Self {
        let inliers: Vec<bool> = residuals.iter().map(|&r| r <= threshold).collect();
        let inlier_count = inliers.iter().filter(|&&b| b).count();
        Self {
            inliers,
            residuals,
            inlier_count,
            score: Score::new(score_value, inlier_count),
        }
    }

    pub fn len(&self) -> usize {
        self.inliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inliers.is_empty()
    }

    pub fn inlier_indices(&self) -> Vec<usize> {
        self.inliers
            .iter()
            .enumerate()
            .filter_map(|(i, &inlier)| inlier.then_some(i))
            .collect()
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            0.0
        } else {
            self.inlier_count as f64 / self.inliers.len() as f64
        }
    }
}

/// RANSAC-style scoring counting residuals within the threshold.
#[derive(Debug, Clone, Copy)]
pub struct RansacScoring {
    threshold: f64,
}

impl RansacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for RansacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: Vec<f64>) -> InliersData {
        let count = residuals.iter().filter(|&&r| r <= self.threshold).count();
        InliersData::classify(residuals, self.threshold, -(count as f64))
    }

    fn is_stop_satisfied(&self, best: &InliersData, _stop_threshold: f64) -> bool {
        !best.is_empty() && best.inlier_count == best.len()
    }
}

/// MSAC scoring: `Σ min(r², t²)`.
#[derive(Debug, Clone, Copy)]
pub struct MsacScoring {
    threshold: f64,
}

impl MsacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for MsacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: Vec<f64>) -> InliersData {
        let t2 = self.threshold * self.threshold;
        let cost: f64 = residuals.iter().map(|&r| (r * r).min(t2)).sum();
        InliersData::classify(residuals, self.threshold, cost)
    }

    fn is_stop_satisfied(&self, best: &InliersData, stop_threshold: f64) -> bool {
        if best.is_empty() {
            return false;
        }
        let mean_cost = best.score.value / best.len() as f64;
        mean_cost.sqrt() <= stop_threshold
    }
}

/// Least median of squares scoring.
///
/// Inliers are still classified with the threshold around the candidate.
#[derive(Debug, Clone, Copy)]
pub struct LmedsScoring {
    threshold: f64,
}

impl LmedsScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for LmedsScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: Vec<f64>) -> InliersData {
        let mut squared: Vec<f64> = residuals.iter().map(|&r| r * r).collect();
        let median = median_in_place(&mut squared);
        let value = if median.is_nan() { f64::INFINITY } else { median };
        InliersData::classify(residuals, self.threshold, value)
    }

    fn is_stop_satisfied(&self, best: &InliersData, stop_threshold: f64) -> bool {
        best.score.value.is_finite() && best.score.value.sqrt() <= stop_threshold
    }
}
