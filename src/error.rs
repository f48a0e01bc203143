//! Error types for the pool registry

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the pool registry
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Pool construction failed
    #[error("Construction of pool kind '{kind}' failed: {reason}")]
    Construction { kind: String, reason: String },

    /// Kind identifier already registered
    #[error("Pool kind already registered: '{0}'")]
    DuplicateKind(String),

    /// Kind identifier rejected at registration time
    #[error("Invalid pool kind identifier: {0:?}")]
    InvalidKind(String),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}
