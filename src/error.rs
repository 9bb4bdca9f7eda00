//! Error types for the permivar library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PermivarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed distance matrix: {0}")]
    Format(String),

    #[error("Join error: {0}")]
    Join(String),

    #[error("Design error: {0}")]
    Design(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, PermivarError>;
