//! Error types for rowforge

use thiserror::Error;

/// Result type alias for rowforge operations
pub type Result<T> = std::result::Result<T, RowforgeError>;

/// Main error type for rowforge
#[derive(Error, Debug)]
pub enum RowforgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Handler '{handler}' failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl RowforgeError {
    /// Shorthand for a handler failure with an owned reason
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}
