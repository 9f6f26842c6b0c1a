//! Error types for the KSON codec engine

use thiserror::Error;

/// Result type for KSON operations
pub type Result<T> = std::result::Result<T, KsonError>;

/// KSON engine errors
#[derive(Error, Debug)]
pub enum KsonError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Schema {id} specifies {expected}, got {actual}")]
    ShapeMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error("Invalid codec pipeline '{spec}': {reason}")]
    InvalidPipeline { spec: String, reason: String },

    #[error("Codec failure: {0}")]
    Codec(String),

    #[error("Cannot infer schema: {0}")]
    Infer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
