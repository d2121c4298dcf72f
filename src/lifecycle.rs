//! Model lifecycle management
//!
//! `ModelManager` resolves a model identifier to a trained forest: an existing
//! record always wins, otherwise a forest is built from the supplied data and
//! persisted. Loading and training run on tokio's blocking pool. Each
//! identifier has its own lock, so concurrent first callers for the same
//! identifier serialize into one training run while unrelated identifiers
//! proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::anomaly::{verifiability_score, AnomalyDetector, ForestConfig, IsolationForest};
use crate::dataset::{validate_contamination, validate_dataset};
use crate::error::{Result, VerifiableError};
use crate::store::{validate_model_id, ModelRecord, ModelStore};

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Where a resolved model came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// An existing record was loaded from the store
    Loaded,
    /// No record existed; a new forest was trained and saved
    Trained,
}

/// A forest resolved by `ModelManager::resolve`
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub forest: Arc<IsolationForest>,
    pub source: ModelSource,
}

/// Read-only status of a model identifier
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub is_trained: bool,
    pub n_features: Option<usize>,
    pub n_samples: Option<usize>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ModelStatus {
    fn untrained(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            is_trained: false,
            n_features: None,
            n_samples: None,
            created_at: None,
        }
    }
}

/// Labels and aggregate score for one detection batch
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub model_id: String,
    /// 1 = normal, -1 = anomaly, aligned with the input rows
    pub labels: Vec<i32>,
    pub raw_scores: Vec<f64>,
    pub verifiability: f64,
    pub source: ModelSource,
}

fn join_to_store_error(e: tokio::task::JoinError) -> VerifiableError {
    VerifiableError::StoreIo(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Holds one identifier's lock and drops its map entry once nobody else uses it
struct LockLease<'a> {
    locks: &'a LockMap,
    model_id: String,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // One reference in the map, one here; anything more is a waiter or a running task
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.model_id);
        }
    }
}

/// Orchestrates load-or-train per model identifier
pub struct ModelManager {
    store: Arc<ModelStore>,
    config: ForestConfig,
    locks: LockMap,
    training_runs: AtomicUsize,
}

impl ModelManager {
    pub fn new(store: Arc<ModelStore>, config: ForestConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
            training_runs: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Number of forests this manager has trained
    pub fn training_runs(&self) -> usize {
        self.training_runs.load(Ordering::Relaxed)
    }

    fn lease(&self, model_id: &str) -> LockLease<'_> {
        let lock = self
            .locks
            .lock()
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        LockLease {
            locks: &self.locks,
            model_id: model_id.to_string(),
            lock,
        }
    }

    /// Return the stored forest for `model_id`, or train and store one from `x`
    ///
    /// An existing record always wins: `x` and `contamination` are ignored
    /// when one is present. Dropping the returned future does not cancel a
    /// build that has already started; it runs to completion, saves its
    /// record and only then releases the identifier's lock.
    pub async fn get_or_train(
        &self,
        model_id: &str,
        x: &Array2<f64>,
        contamination: f64,
    ) -> Result<Arc<IsolationForest>> {
        Ok(self.resolve(model_id, x, contamination).await?.forest)
    }

    /// `get_or_train`, also reporting whether the forest was loaded or trained
    pub async fn resolve(
        &self,
        model_id: &str,
        x: &Array2<f64>,
        contamination: f64,
    ) -> Result<ResolvedModel> {
        validate_model_id(model_id)?;
        validate_dataset(x)?;
        validate_contamination(contamination)?;

        let lease = self.lease(model_id);
        let guard = Arc::clone(&lease.lock).lock_owned().await;

        let store = Arc::clone(&self.store);
        let id = model_id.to_string();

        // Existence check and load share one trip to the blocking pool
        let existing = tokio::task::spawn_blocking(move || -> Result<_> {
            if store.exists(&id) {
                info!(model_id = %id, "Loading model from store");
                store.load(&id).map(Some)
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(join_to_store_error)??;

        if let Some(record) = existing {
            return Ok(ResolvedModel {
                forest: Arc::new(record.forest),
                source: ModelSource::Loaded,
            });
        }

        info!(
            model_id = %model_id,
            samples = x.nrows(),
            features = x.ncols(),
            contamination,
            num_trees = self.config.num_trees,
            subsample_size = self.config.subsample_size,
            "Training new Isolation Forest"
        );

        let store = Arc::clone(&self.store);
        let id = model_id.to_string();
        let config = self.config;
        let data = x.clone();
        self.training_runs.fetch_add(1, Ordering::Relaxed);
        let forest = tokio::task::spawn_blocking(move || -> Result<IsolationForest> {
            let _guard = guard;
            let started = Instant::now();
            let forest = IsolationForest::build(&data, &config, contamination)?;
            let record = ModelRecord::new(id.as_str(), forest, data.nrows());
            store.save(&record)?;
            info!(
                model_id = %id,
                threshold = record.forest.threshold(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Model trained and saved"
            );
            Ok(record.forest)
        })
        .await
        .map_err(|e| VerifiableError::TrainingFailure(format!("training task failed: {}", e)))??;

        Ok(ResolvedModel {
            forest: Arc::new(forest),
            source: ModelSource::Trained,
        })
    }

    /// Resolve the model, then label and score `x` against it
    ///
    /// `x` doubles as training data when no record exists for `model_id`.
    pub async fn detect(
        &self,
        model_id: &str,
        x: Array2<f64>,
        contamination: f64,
    ) -> Result<Detection> {
        let resolved = self.resolve(model_id, &x, contamination).await?;
        let forest = Arc::clone(&resolved.forest);

        let result = tokio::task::spawn_blocking(move || forest.detect(&x))
            .await
            .map_err(|e| VerifiableError::TrainingFailure(format!("scoring task failed: {}", e)))??;

        let raw_scores = result.scores.to_vec();
        let verifiability = verifiability_score(&raw_scores)?;
        debug!(
            model_id = %model_id,
            samples = raw_scores.len(),
            anomalies = result.n_anomalies,
            verifiability,
            "Detection complete"
        );

        Ok(Detection {
            model_id: model_id.to_string(),
            labels: result.labels.to_vec(),
            raw_scores,
            verifiability,
            source: resolved.source,
        })
    }

    /// Report whether a trained record exists; never trains
    ///
    /// Identifiers that could never name a record are simply untrained.
    pub async fn status(&self, model_id: &str) -> Result<ModelStatus> {
        if validate_model_id(model_id).is_err() {
            return Ok(ModelStatus::untrained(model_id));
        }

        let store = Arc::clone(&self.store);
        let id = model_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || {
            if store.exists(&id) {
                store.load(&id).map(Some)
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(join_to_store_error)?;

        match loaded {
            Ok(None) => Ok(ModelStatus::untrained(model_id)),
            Ok(Some(record)) => Ok(ModelStatus {
                model_id: model_id.to_string(),
                is_trained: true,
                n_features: Some(record.forest.n_features()),
                n_samples: Some(record.n_samples),
                created_at: Some(record.created_at),
            }),
            Err(e) => {
                warn!(model_id = %model_id, error = %e, "Stored model could not be read");
                Ok(ModelStatus::untrained(model_id))
            }
        }
    }

    /// Delete one record; waits for any in-flight build of the same identifier
    pub async fn delete(&self, model_id: &str) -> Result<bool> {
        validate_model_id(model_id)?;
        let lease = self.lease(model_id);
        let _guard = lease.lock.lock().await;
        self.store.delete(model_id)
    }

    /// Delete every record in the store
    pub fn purge(&self) -> Result<usize> {
        self.store.purge()
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }
}
