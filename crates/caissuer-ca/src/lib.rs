//! # caissuer-ca
//!
//! Certificate authority engine used by the issuer controller.
//!
//! The engine has two jobs:
//! - compute a deterministic *preview* of the CA certificate a request would
//!   produce (serial number and validity window), without touching any key;
//! - actually sign that certificate with the referenced key.
//!
//! Signing the same [`CertificateRequest`] always reproduces the serial number
//! and validity of its preview, so a controller can compare a stored
//! certificate against the preview to decide whether reissuance is needed.

pub mod codec;
mod engine;
mod error;
pub mod local;
mod preview;

pub use codec::{encode_certificate_pem, parse_certificate_pem, ParsedCertificate};
pub use engine::{CaEngine, CertificateRequest, SignedCertificate, Subject};
pub use error::{CaError, CaResult};
pub use local::{Keyring, LocalCaEngine};
pub use preview::{preview_certificate, CertificatePreview, SerialNumber};

/// Type alias for a shared engine trait object.
pub type DynCaEngine = std::sync::Arc<dyn CaEngine>;
