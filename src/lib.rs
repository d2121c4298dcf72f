//! Verifiable Engine - anomaly detection with empirical verifiability scores
//!
//! This crate trains one Isolation Forest per model identifier, persists it,
//! and reuses it for later requests. Detection returns a label per sample and
//! a single batch-level verifiability score.
//!
//! # Modules
//!
//! - [`anomaly`] - Isolation Forest engine and verifiability scoring
//! - [`dataset`] - Dataset construction and validation
//! - [`store`] - Durable, keyed model persistence
//! - [`lifecycle`] - Load-or-train orchestration with per-identifier locking
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod anomaly;
pub mod dataset;
pub mod store;
pub mod lifecycle;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, VerifiableError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, VerifiableError};

    pub use crate::anomaly::{
        verifiability_score, AnomalyDetector, AnomalyResult, ForestConfig, IsolationForest,
        IsolationTree,
    };

    pub use crate::dataset::{dataset_from_rows, validate_contamination};

    pub use crate::store::{ModelRecord, ModelStore};

    pub use crate::lifecycle::{Detection, ModelManager, ModelSource, ModelStatus, ResolvedModel};
}
