//! Isolation Forest anomaly detection

use crate::anomaly::{AnomalyDetector, AnomalyResult};
use crate::dataset::{validate_contamination, validate_dataset};
use crate::error::{Result, VerifiableError};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant used by the harmonic number approximation
const EULER_GAMMA: f64 = 0.5772156649;

/// Expected path length of an unsuccessful search in a random binary tree of `n` points
///
/// c(n) = 2 * (ln(n - 1) + γ) - 2(n - 1)/n for n > 1, and 0 otherwise.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        let n_f = n as f64;
        2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
    }
}

/// Isolation Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsolationTree {
    /// Internal node with split
    Internal {
        /// Feature index for split
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Left subtree (values < threshold)
        left: Box<IsolationTree>,
        /// Right subtree (values >= threshold)
        right: Box<IsolationTree>,
    },
    /// External (leaf) node
    External {
        /// Number of training points that reached this leaf
        size: usize,
        /// Depth at which growth stopped
        depth: usize,
    },
}

impl IsolationTree {
    /// Grow an isolation tree over the rows of `x` named by `indices`
    pub fn grow(
        x: &Array2<f64>,
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let n_samples = indices.len();

        if depth >= max_depth || n_samples <= 1 {
            return IsolationTree::External { size: n_samples, depth };
        }

        // Only features with a non-degenerate range at this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (min_val, max_val) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(x[[i, feature]]), hi.max(x[[i, feature]])),
                );
                (max_val > min_val).then_some((feature, min_val, max_val))
            })
            .collect();

        if candidates.is_empty() {
            return IsolationTree::External { size: n_samples, depth };
        }

        let (feature, min_val, max_val) = candidates[rng.gen_range(0..candidates.len())];

        // Interpolate rather than subtract so huge ranges cannot overflow
        let u: f64 = rng.gen();
        let threshold = min_val * (1.0 - u) + max_val * u;

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] < threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { size: n_samples, depth };
        }

        let left = Box::new(Self::grow(x, &left_indices, depth + 1, max_depth, rng));
        let right = Box::new(Self::grow(x, &right_indices, depth + 1, max_depth, rng));

        IsolationTree::Internal {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Path length of a sample: leaf depth plus the correction for the points left in the leaf
    pub fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                IsolationTree::External { size, depth } => {
                    return *depth as f64 + average_path_length(*size);
                }
                IsolationTree::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { left } else { right };
                }
            }
        }
    }

    /// Total number of training points recorded across the leaves
    pub fn n_points(&self) -> usize {
        match self {
            IsolationTree::External { size, .. } => *size,
            IsolationTree::Internal { left, right, .. } => left.n_points() + right.n_points(),
        }
    }
}

/// Forest hyperparameters fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub num_trees: usize,
    /// Points drawn per tree
    pub subsample_size: usize,
    /// Base random seed; tree `i` is seeded with `seed + i`
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: std::env::var("IFOREST_TREES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            subsample_size: std::env::var("IFOREST_SUBSAMPLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            seed: std::env::var("IFOREST_SEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(42),
        }
    }
}

impl ForestConfig {
    /// Set number of trees
    pub fn with_num_trees(mut self, n: usize) -> Self {
        self.num_trees = n;
        self
    }

    /// Set points drawn per tree
    pub fn with_subsample_size(mut self, n: usize) -> Self {
        self.subsample_size = n;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(VerifiableError::TrainingFailure(
                "forest needs at least one tree".to_string(),
            ));
        }
        if self.subsample_size < 2 {
            return Err(VerifiableError::TrainingFailure(format!(
                "subsample size {} is too small to isolate anything",
                self.subsample_size
            )));
        }
        Ok(())
    }

    /// Depth limit for every tree: ceil(log2(subsample_size))
    pub fn max_depth(&self) -> usize {
        (self.subsample_size as f64).log2().ceil() as usize
    }
}

/// Draw one subsample: with replacement when the dataset is smaller than the subsample
fn draw_subsample(n_samples: usize, subsample_size: usize, rng: &mut impl Rng) -> Vec<usize> {
    if n_samples < subsample_size {
        (0..subsample_size)
            .map(|_| rng.gen_range(0..n_samples))
            .collect()
    } else {
        rand::seq::index::sample(rng, n_samples, subsample_size).into_vec()
    }
}

/// Trained Isolation Forest. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    config: ForestConfig,
    /// Contamination ratio (expected proportion of outliers)
    contamination: f64,
    /// Dimensionality of the training data
    n_features: usize,
    trees: Vec<IsolationTree>,
    /// Raw scores strictly above this are anomalies
    threshold: f64,
}

impl IsolationForest {
    /// Build a forest from a dataset and derive its decision threshold
    pub fn build(x: &Array2<f64>, config: &ForestConfig, contamination: f64) -> Result<Self> {
        validate_dataset(x)?;
        validate_contamination(contamination)?;
        config.validate()?;

        let n_samples = x.nrows();
        let max_depth = config.max_depth();
        let base_seed = config.seed;
        let subsample_size = config.subsample_size;

        let trees: Vec<IsolationTree> = (0..config.num_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let indices = draw_subsample(n_samples, subsample_size, &mut rng);
                IsolationTree::grow(x, &indices, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            config: *config,
            contamination,
            n_features: x.ncols(),
            trees,
            threshold: f64::NAN,
        };

        // Most anomalous first; the boundary sits floor(contamination * N) places in
        let mut sorted: Vec<f64> = x.rows().into_iter().map(|row| forest.score_row(row)).collect();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let threshold_idx = ((contamination * n_samples as f64).floor() as usize).min(n_samples - 1);
        let threshold = sorted[threshold_idx];

        if !threshold.is_finite() {
            return Err(VerifiableError::TrainingFailure(format!(
                "derived threshold is not finite: {}",
                threshold
            )));
        }
        forest.threshold = threshold;

        Ok(forest)
    }

    /// Anomaly score of one sample, in (0, 1]; higher is more anomalous
    pub fn raw_score(&self, sample: &[f64]) -> Result<f64> {
        self.check_dimensions(sample.len())?;
        Ok(self.score_slice(sample))
    }

    /// Label one sample: -1 for anomaly, 1 for normal
    pub fn label(&self, sample: &[f64]) -> Result<i32> {
        Ok(self.label_for(self.raw_score(sample)?))
    }

    fn label_for(&self, score: f64) -> i32 {
        if score > self.threshold {
            -1
        } else {
            1
        }
    }

    fn check_dimensions(&self, n_features: usize) -> Result<()> {
        if n_features != self.n_features {
            return Err(VerifiableError::InvalidInput(format!(
                "sample has {} features, model was trained on {}",
                n_features, self.n_features
            )));
        }
        Ok(())
    }

    fn score_row(&self, row: ndarray::ArrayView1<'_, f64>) -> f64 {
        match row.as_slice() {
            Some(sample) => self.score_slice(sample),
            None => self.score_slice(&row.to_vec()),
        }
    }

    // s(x, n) = 2^(-E[h(x)] / c(n))
    fn score_slice(&self, sample: &[f64]) -> f64 {
        let avg_path_length: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum::<f64>()
            / self.trees.len() as f64;

        2.0_f64.powf(-avg_path_length / average_path_length(self.config.subsample_size))
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }
}

impl AnomalyDetector for IsolationForest {
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_dimensions(x.ncols())?;
        Ok(x.rows().into_iter().map(|row| self.score_row(row)).collect())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>> {
        let scores = self.score_samples(x)?;
        Ok(scores.mapv(|s| self.label_for(s)))
    }

    // Labels come from the same score array; no second pass over the trees
    fn detect(&self, x: &Array2<f64>) -> Result<AnomalyResult> {
        let scores = self.score_samples(x)?;
        let labels = scores.mapv(|s| self.label_for(s));
        let n_anomalies = labels.iter().filter(|&&l| l == -1).count();

        Ok(AnomalyResult {
            scores,
            labels,
            threshold: self.threshold,
            n_anomalies,
        })
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
