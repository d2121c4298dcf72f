//! Anomaly detection module
//!
//! Provides:
//! - Isolation Forest, built directly from randomized partition trees
//! - Empirical verifiability scoring over batches of raw anomaly scores

mod isolation_forest;
mod verifiability;

pub use isolation_forest::{average_path_length, ForestConfig, IsolationForest, IsolationTree};
pub use verifiability::verifiability_score;

use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Anomaly detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Anomaly scores (higher = more anomalous)
    pub scores: Array1<f64>,
    /// Labels (-1 = anomaly, 1 = normal)
    pub labels: Array1<i32>,
    /// Threshold used for classification
    pub threshold: f64,
    /// Number of anomalies detected
    pub n_anomalies: usize,
}

/// Trait for fitted anomaly detectors
pub trait AnomalyDetector: Send + Sync {
    /// Compute anomaly scores for new data
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Predict labels (-1 = anomaly, 1 = normal)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>>;

    /// Get detection results with scores and labels
    fn detect(&self, x: &Array2<f64>) -> Result<AnomalyResult> {
        let scores = self.score_samples(x)?;
        let labels = self.predict(x)?;
        let threshold = self.threshold();
        let n_anomalies = labels.iter().filter(|&&l| l == -1).count();

        Ok(AnomalyResult {
            scores,
            labels,
            threshold,
            n_anomalies,
        })
    }

    /// Get the decision threshold
    fn threshold(&self) -> f64;
}
