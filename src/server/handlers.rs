//! HTTP request handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::dataset_from_rows;
use crate::lifecycle::{ModelSource, ModelStatus};

use super::error::{Result, ServerError};
use super::state::AppState;

fn default_model_id() -> String {
    "default_model".to_string()
}

fn default_contamination() -> f64 {
    0.01
}

// ============================================================================
// Training
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrainingData {
    data: Vec<Vec<f64>>,
    #[serde(default = "default_model_id")]
    model_id: String,
    #[serde(default = "default_contamination")]
    contamination: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingResult {
    pub model_id: String,
    pub status: String,
    pub message: String,
}

pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainingData>,
) -> Result<(StatusCode, Json<TrainingResult>)> {
    if request.data.is_empty() {
        return Err(ServerError::BadRequest("Training data cannot be empty.".to_string()));
    }
    let x = dataset_from_rows(&request.data)?;

    let resolved = state
        .manager
        .resolve(&request.model_id, &x, request.contamination)
        .await?;

    let message = match resolved.source {
        ModelSource::Trained => "Model trained and saved.",
        ModelSource::Loaded => "Model already exists; existing model retained.",
    };

    Ok((
        StatusCode::CREATED,
        Json(TrainingResult {
            model_id: request.model_id,
            status: "Success".to_string(),
            message: message.to_string(),
        }),
    ))
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DataInput {
    data: Vec<Vec<f64>>,
    #[serde(default = "default_model_id")]
    model_id: String,
    #[serde(default = "default_contamination")]
    contamination: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnomalyDetectionOutput {
    pub model_id: String,
    /// 1 for normal, -1 for anomaly, one per input sample
    pub anomalies: Vec<i32>,
    pub empirical_verifiability_score: f64,
    pub processing_time_ms: f64,
}

pub async fn detect_anomalies(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DataInput>,
) -> Result<Json<AnomalyDetectionOutput>> {
    let start_time = Instant::now();

    if request.data.is_empty() {
        return Err(ServerError::BadRequest("Input data cannot be empty.".to_string()));
    }
    let x = dataset_from_rows(&request.data)?;

    let detection = state
        .manager
        .detect(&request.model_id, x, request.contamination)
        .await?;

    let processing_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    info!(
        model_id = %detection.model_id,
        samples = detection.labels.len(),
        verifiability = detection.verifiability,
        processing_time_ms,
        "Anomaly detection served"
    );

    Ok(Json(AnomalyDetectionOutput {
        model_id: detection.model_id,
        anomalies: detection.labels,
        empirical_verifiability_score: detection.verifiability,
        processing_time_ms,
    }))
}

// ============================================================================
// Model Handlers
// ============================================================================

pub async fn model_status(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelStatus>> {
    Ok(Json(state.manager.status(&model_id).await?))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let models = state.manager.list()?;
    Ok(Json(serde_json::json!({
        "models": models,
    })))
}

pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !state.manager.delete(&model_id).await? {
        return Err(ServerError::NotFound(format!("Model not found: {}", model_id)));
    }
    info!(model_id = %model_id, "Model deleted by administrative request");
    Ok(Json(serde_json::json!({
        "success": true,
        "model_id": model_id,
    })))
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let now = chrono::Utc::now();
    Json(serde_json::json!({
        "status": "operational",
        "timestamp": now.timestamp_millis() as f64 / 1000.0,
        "uptime_secs": now.signed_duration_since(state.started_at).num_seconds(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
