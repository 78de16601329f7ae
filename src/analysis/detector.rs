//! Anomaly Detectors
//!
//! Statistical novelty detectors scoring entropy-profile feature vectors.
//! Detectors are fitted once against reference ("known-good") vectors and
//! then scored concurrently from many pipeline tasks — fitted state lives
//! behind an `RwLock` and scoring only takes read access.
//!
//! An unfitted detector signals [`DetectorError::NotFitted`]; callers treat
//! that as "no finding produced", never as a stage failure.

use crate::types::{AnomalyFinding, MetaValue, MetadataMap};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DetectorError {
    #[error("detector has not been fitted")]
    NotFitted,
    #[error("invalid training set: {0}")]
    InvalidTrainingSet(String),
    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Capability contract for anomaly scoring models.
///
/// Implementations are `Send + Sync` so a single fitted instance can be
/// shared across all in-flight jobs behind an `Arc`.
pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the detector holds a fitted model.
    fn is_fitted(&self) -> bool;

    /// Fit the detector against reference feature vectors.
    fn fit(&self, samples: &[Vec<f64>]) -> Result<(), DetectorError>;

    /// Score one feature vector against the fitted model.
    fn score(&self, features: &[f64]) -> Result<AnomalyFinding, DetectorError>;
}

// ============================================================================
// Z-Score Detector
// ============================================================================

struct ZScoreModel {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

/// Per-feature gaussian detector.
///
/// Fits mean and standard deviation per feature; the score is the largest
/// absolute z-score across features, with a two-sided normal tail
/// probability reported in the details.
pub struct ZScoreDetector {
    threshold: f64,
    model: RwLock<Option<ZScoreModel>>,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            model: RwLock::new(None),
        }
    }
}

impl AnomalyDetector for ZScoreDetector {
    fn name(&self) -> &str {
        "zscore"
    }

    fn is_fitted(&self) -> bool {
        self.model.read().map(|m| m.is_some()).unwrap_or(false)
    }

    fn fit(&self, samples: &[Vec<f64>]) -> Result<(), DetectorError> {
        if samples.len() < 2 {
            return Err(DetectorError::InvalidTrainingSet(
                "need at least 2 reference vectors".into(),
            ));
        }
        let dims = samples[0].len();
        if dims == 0 || samples.iter().any(|s| s.len() != dims) {
            return Err(DetectorError::InvalidTrainingSet(
                "reference vectors must share a non-zero dimension".into(),
            ));
        }

        let mut means = Vec::with_capacity(dims);
        let mut std_devs = Vec::with_capacity(dims);
        for d in 0..dims {
            let column: Vec<f64> = samples.iter().map(|s| s[d]).collect();
            means.push(column.as_slice().mean());
            // Degenerate (constant) features get a tiny floor so later
            // z-scores stay finite.
            std_devs.push(column.as_slice().std_dev().max(1e-9));
        }

        *self
            .model
            .write()
            .map_err(|_| DetectorError::InvalidTrainingSet("poisoned lock".into()))? =
            Some(ZScoreModel { means, std_devs });
        Ok(())
    }

    fn score(&self, features: &[f64]) -> Result<AnomalyFinding, DetectorError> {
        let guard = self.model.read().map_err(|_| DetectorError::NotFitted)?;
        let model = guard.as_ref().ok_or(DetectorError::NotFitted)?;

        if features.len() != model.means.len() {
            return Err(DetectorError::DimensionMismatch {
                expected: model.means.len(),
                actual: features.len(),
            });
        }

        let max_z = features
            .iter()
            .zip(model.means.iter().zip(model.std_devs.iter()))
            .map(|(x, (mean, sd))| ((x - mean) / sd).abs())
            .fold(0.0f64, f64::max);

        // Two-sided tail probability under the standard normal.
        let tail_probability = Normal::new(0.0, 1.0)
            .map(|n| 2.0 * (1.0 - n.cdf(max_z)))
            .unwrap_or(0.0);

        let mut details = MetadataMap::new();
        details.insert("threshold".into(), MetaValue::Float(self.threshold));
        details.insert(
            "tail_probability".into(),
            MetaValue::Float(tail_probability),
        );

        Ok(AnomalyFinding {
            detector_name: self.name().to_string(),
            score: max_z,
            is_anomaly: max_z > self.threshold,
            details,
        })
    }
}

// ============================================================================
// Nearest-Neighbour Detector
// ============================================================================

struct NeighborModel {
    samples: Vec<Vec<f64>>,
    /// Mean k-NN distance among the fitted samples themselves.
    baseline_distance: f64,
}

/// Distance-ratio novelty detector.
///
/// The score is the mean distance from the input to its `k` nearest fitted
/// vectors, divided by the mean k-NN distance observed inside the fitted
/// set. Ratios near 1.0 mean the input sits in known territory.
pub struct NearestNeighborDetector {
    k: usize,
    ratio_threshold: f64,
    model: RwLock<Option<NeighborModel>>,
}

impl NearestNeighborDetector {
    pub fn new(k: usize, ratio_threshold: f64) -> Self {
        Self {
            k: k.max(1),
            ratio_threshold,
            model: RwLock::new(None),
        }
    }

    fn mean_knn_distance(&self, point: &[f64], samples: &[Vec<f64>], skip: Option<usize>) -> f64 {
        let mut distances: Vec<f64> = samples
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, s)| euclidean(point, s))
            .collect();
        distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let k = self.k.min(distances.len());
        distances.iter().take(k).sum::<f64>() / k as f64
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl AnomalyDetector for NearestNeighborDetector {
    fn name(&self) -> &str {
        "nearest_neighbor"
    }

    fn is_fitted(&self) -> bool {
        self.model.read().map(|m| m.is_some()).unwrap_or(false)
    }

    fn fit(&self, samples: &[Vec<f64>]) -> Result<(), DetectorError> {
        if samples.len() <= self.k {
            return Err(DetectorError::InvalidTrainingSet(format!(
                "need more than {} reference vectors",
                self.k
            )));
        }
        let dims = samples[0].len();
        if dims == 0 || samples.iter().any(|s| s.len() != dims) {
            return Err(DetectorError::InvalidTrainingSet(
                "reference vectors must share a non-zero dimension".into(),
            ));
        }

        let owned: Vec<Vec<f64>> = samples.to_vec();
        let baseline = owned
            .iter()
            .enumerate()
            .map(|(i, s)| self.mean_knn_distance(s, &owned, Some(i)))
            .sum::<f64>()
            / owned.len() as f64;

        *self
            .model
            .write()
            .map_err(|_| DetectorError::InvalidTrainingSet("poisoned lock".into()))? =
            Some(NeighborModel {
                samples: owned,
                baseline_distance: baseline.max(1e-9),
            });
        Ok(())
    }

    fn score(&self, features: &[f64]) -> Result<AnomalyFinding, DetectorError> {
        let guard = self.model.read().map_err(|_| DetectorError::NotFitted)?;
        let model = guard.as_ref().ok_or(DetectorError::NotFitted)?;

        let dims = model.samples[0].len();
        if features.len() != dims {
            return Err(DetectorError::DimensionMismatch {
                expected: dims,
                actual: features.len(),
            });
        }

        let mean_distance = self.mean_knn_distance(features, &model.samples, None);
        let ratio = mean_distance / model.baseline_distance;

        let mut details = MetadataMap::new();
        details.insert(
            "threshold".into(),
            MetaValue::Float(self.ratio_threshold),
        );
        details.insert("mean_distance".into(), MetaValue::Float(mean_distance));

        Ok(AnomalyFinding {
            detector_name: self.name().to_string(),
            score: ratio,
            is_anomaly: ratio > self.ratio_threshold,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_cluster() -> Vec<Vec<f64>> {
        // Tight cluster around (1.0, 2.0, 3.0) with mild jitter.
        (0..12)
            .map(|i| {
                let j = (i as f64) * 0.01;
                vec![1.0 + j, 2.0 - j, 3.0 + j / 2.0]
            })
            .collect()
    }

    #[test]
    fn unfitted_detectors_signal_not_fitted() {
        let z = ZScoreDetector::new(3.0);
        assert_eq!(z.score(&[1.0, 2.0, 3.0]), Err(DetectorError::NotFitted));
        assert!(!z.is_fitted());

        let nn = NearestNeighborDetector::new(5, 1.5);
        assert_eq!(nn.score(&[1.0, 2.0, 3.0]), Err(DetectorError::NotFitted));
    }

    #[test]
    fn zscore_flags_distant_points_only() {
        let z = ZScoreDetector::new(3.0);
        z.fit(&reference_cluster()).unwrap();

        let inlier = z.score(&[1.05, 1.95, 3.02]).unwrap();
        assert!(!inlier.is_anomaly, "inlier score {}", inlier.score);

        let outlier = z.score(&[50.0, -40.0, 99.0]).unwrap();
        assert!(outlier.is_anomaly, "outlier score {}", outlier.score);
        assert!(outlier.score > inlier.score);
    }

    #[test]
    fn zscore_rejects_dimension_mismatch() {
        let z = ZScoreDetector::new(3.0);
        z.fit(&reference_cluster()).unwrap();
        assert!(matches!(
            z.score(&[1.0]),
            Err(DetectorError::DimensionMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn nearest_neighbor_ratio_separates_novelty() {
        let nn = NearestNeighborDetector::new(3, 1.5);
        nn.fit(&reference_cluster()).unwrap();

        let inlier = nn.score(&[1.02, 1.98, 3.01]).unwrap();
        assert!(!inlier.is_anomaly, "inlier ratio {}", inlier.score);

        let outlier = nn.score(&[30.0, 30.0, 30.0]).unwrap();
        assert!(outlier.is_anomaly, "outlier ratio {}", outlier.score);
    }

    #[test]
    fn fit_requires_enough_samples() {
        let nn = NearestNeighborDetector::new(5, 1.5);
        let few = vec![vec![0.0, 0.0]; 3];
        assert!(matches!(
            nn.fit(&few),
            Err(DetectorError::InvalidTrainingSet(_))
        ));
    }
}
