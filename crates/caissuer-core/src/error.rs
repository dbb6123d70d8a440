use thiserror::Error;

/// Core error types for issuer model operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid resource key: {0}")]
    InvalidResourceKey(String),
}

impl CoreError {
    /// Create a new InvalidDuration error
    pub fn invalid_duration(duration: impl Into<String>) -> Self {
        Self::InvalidDuration(duration.into())
    }

    /// Create a new InvalidResourceKey error
    pub fn invalid_resource_key(key: impl Into<String>) -> Self {
        Self::InvalidResourceKey(key.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
