use thiserror::Error;

/// Top-level error type for Desterra.
#[derive(Debug, Error)]
pub enum DesterraError {
    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed media payload.
    #[error("media error: {0}")]
    Media(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
