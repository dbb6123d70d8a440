//! Errors returned by a reconcile pass.

use caissuer_ca::CaError;
use caissuer_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A required spec field is missing or invalid.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The CA engine failed to sign the certificate.
    #[error("signing failed: {0}")]
    Signing(#[source] CaError),

    /// The status update was rejected or the store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),

    /// The pass was cancelled before it completed.
    #[error("reconcile cancelled")]
    Cancelled,
}

/// Coarse error classification used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Signing,
    Persistence,
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Signing => "signing",
            Self::Persistence => "persistence",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReconcileError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the same spec can succeed on a later attempt.
    ///
    /// Validation errors need a spec edit; the host still backs off and
    /// retries them, but a retry alone will not fix them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Signing(_) | Self::Cancelled => true,
            Self::Persistence(e) => e.is_retryable(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Signing(_) => ErrorCategory::Signing,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Errors loading an issuer manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid issuer entry: {0}")]
    Invalid(String),
}
