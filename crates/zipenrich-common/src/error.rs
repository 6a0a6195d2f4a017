//! Error types shared across zipenrich crates

use thiserror::Error;

/// Result type alias for configuration and setup operations
pub type Result<T> = std::result::Result<T, ZipEnrichError>;

/// Errors raised before a run starts (configuration, environment)
#[derive(Error, Debug)]
pub enum ZipEnrichError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
}

impl ZipEnrichError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an error for an environment variable that failed to parse
    pub fn invalid_value(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.into(),
            value: value.into(),
        }
    }
}
