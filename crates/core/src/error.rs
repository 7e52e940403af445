//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid provider name: {0}")]
    InvalidProvider(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid os: {0}")]
    InvalidOs(String),

    #[error("invalid architecture: {0}")]
    InvalidArch(String),

    #[error("invalid archive filename: {0}")]
    InvalidFilename(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
