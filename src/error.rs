//! Error types for statchill.

use thiserror::Error;

/// Main error type for the library.
///
/// `Schema`, `EmptyResult` and `InsufficientData` abort a whole run. `DegenerateGroup`
/// is scoped to a single variable and is recorded next to the other outcomes.
#[derive(Error, Debug)]
pub enum StatError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Degenerate group for variable '{variable}': {reason}")]
    DegenerateGroup { variable: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatError {
    pub(crate) fn degenerate(variable: &str, reason: impl Into<String>) -> Self {
        StatError::DegenerateGroup {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only concern one variable and must not stop the run.
    pub fn is_variable_scoped(&self) -> bool {
        matches!(self, StatError::DegenerateGroup { .. })
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, StatError>;
