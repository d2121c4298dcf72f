//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::VerifiableError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] VerifiableError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Engine(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ServerError::Engine(VerifiableError::ModelNotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Model not found: {}", id))
            }
            ServerError::Engine(e @ VerifiableError::TrainingFailure(_)) => {
                tracing::error!(detail = %e, "Training error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to train model: {}", e),
                )
            }
            ServerError::Engine(e) => {
                tracing::error!(detail = %e, "Model store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A model storage error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                VerifiableError::InvalidInput("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                VerifiableError::ModelNotFound("x".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                VerifiableError::TrainingFailure("x".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                VerifiableError::Serialization("x".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
