//! Error types for CA engine operations.

use thiserror::Error;

/// Errors raised by previews, signing and certificate parsing.
#[derive(Debug, Error)]
pub enum CaError {
    /// The referenced signing key is not known to the engine.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The request cannot describe a valid certificate.
    #[error("invalid certificate request: {0}")]
    InvalidRequest(String),

    /// The signing backend failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Key material could not be loaded or generated.
    #[error("key error: {0}")]
    Key(String),

    /// Certificate bytes are not a well-formed PEM encoded X.509 certificate.
    #[error("certificate parsing error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaError {
    pub fn key_not_found(key_reference: impl Into<String>) -> Self {
        Self::KeyNotFound(key_reference.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Result type for CA operations
pub type CaResult<T> = std::result::Result<T, CaError>;
