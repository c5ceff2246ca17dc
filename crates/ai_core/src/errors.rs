//! Error types for the AI Core module

use crate::serde_canon::CanonicalError;
use thiserror::Error;

/// Errors that can occur while building, loading or executing a model artifact
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input row width does not match the model's declared feature count
    #[error("Shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Model or graph structure is invalid
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Artifact format name or version is not supported by this runtime
    #[error("Unsupported artifact format: {0}")]
    UnsupportedFormat(String),

    /// Stored graph hash does not match the recomputed one
    #[error("Artifact hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Canonical serialization error
    #[error("Canonical serialization error: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Result type for AI Core operations
pub type Result<T> = std::result::Result<T, CoreError>;
