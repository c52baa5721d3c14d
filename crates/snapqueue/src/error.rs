//! Error types for snapqueue

use thiserror::Error;

/// Result type alias for snapqueue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Snapqueue errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Uploader is not registered or not configured
    #[error("Uploader error: {0}")]
    Uploader(String),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// History database error
    #[error("History database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Affinity worker has shut down
    #[error("Affinity worker is not running")]
    AffinityClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a stage error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create an uploader error
    pub fn uploader(message: impl Into<String>) -> Self {
        Self::Uploader(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
