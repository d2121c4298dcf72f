//! Error types for the verifiable engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, VerifiableError>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum VerifiableError {
    /// Out-of-contract input, rejected before any model lookup
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Training failure: {0}")]
    TrainingFailure(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Store IO error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VerifiableError {
    /// Whether the error was caused by the caller rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(self, VerifiableError::InvalidInput(_))
    }
}

impl From<bincode::Error> for VerifiableError {
    fn from(err: bincode::Error) -> Self {
        VerifiableError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VerifiableError {
    fn from(err: serde_json::Error) -> Self {
        VerifiableError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VerifiableError {
    fn from(err: ndarray::ShapeError) -> Self {
        VerifiableError::InvalidInput(format!("invalid dataset shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VerifiableError::InvalidInput("empty dataset".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty dataset");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VerifiableError = io_err.into();
        assert!(matches!(err, VerifiableError::StoreIo(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_invalid_input_is_client_error() {
        let err = VerifiableError::InvalidInput("contamination 0.9 outside [0, 0.5]".to_string());
        assert!(err.is_client_error());
        assert!(!VerifiableError::TrainingFailure("no trees".to_string()).is_client_error());
    }
}
