//! Error types for the change stream.

use thiserror::Error;

/// Result type alias for change stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur in the change stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Watched root does not exist.
    #[error("watched root not found: {0}")]
    RootNotFound(String),

    /// Watched root exists but is not a directory.
    #[error("watched root is not a directory: {0}")]
    NotADirectory(String),

    /// A diff could not be applied to the content it was given.
    #[error("patch does not apply at line {line}: {reason}")]
    PatchMismatch { line: usize, reason: String },

    /// The pipeline task is gone.
    #[error("channel error: pipeline is no longer running")]
    ChannelClosed,

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
