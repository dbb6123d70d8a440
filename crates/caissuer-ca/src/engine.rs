//! The CA engine contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::CaResult;
use crate::preview::{CertificatePreview, SerialNumber};

/// Subject distinguished name of the CA certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub common_name: String,
}

impl Subject {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
        }
    }
}

/// Parameters of a CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Opaque handle of the signing key.
    pub key_reference: String,
    pub subject: Subject,
    /// Validity length of the certificate.
    pub duration: Duration,
    /// Window `not_before` is floored to, so repeated previews inside one
    /// window agree on the validity and serial number.
    pub rounding: Duration,
    /// Reference instant the validity window is derived from.
    pub at: OffsetDateTime,
}

/// A signed CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    /// DER encoded X.509 certificate.
    pub der: Vec<u8>,
    pub serial: SerialNumber,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Certificate authority backend.
///
/// Implementations must be safe to share between concurrent reconciles.
/// Signing must be safely repeatable: the controller may sign the same request
/// again when persisting a previous result failed.
#[async_trait]
pub trait CaEngine: Send + Sync {
    /// Computes the certificate a request would produce, without signing.
    ///
    /// Deterministic: equal requests yield equal previews.
    fn preview(&self, request: &CertificateRequest) -> CaResult<CertificatePreview>;

    /// Signs and issues the certificate described by `request`.
    ///
    /// The result carries the same serial number and validity as
    /// [`CaEngine::preview`] for the same request.
    async fn sign_and_issue(&self, request: &CertificateRequest) -> CaResult<SignedCertificate>;

    /// Returns the name of this engine for logging/debugging.
    fn engine_name(&self) -> &'static str;
}
