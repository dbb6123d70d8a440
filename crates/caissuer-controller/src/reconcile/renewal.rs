//! Renewal decision for the stored CA certificate.

use std::fmt;

use caissuer_ca::{parse_certificate_pem, CertificatePreview};
use time::{Duration, OffsetDateTime};

/// Why a certificate has to be (re)issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalReason {
    /// No certificate is stored yet.
    Missing,
    /// The stored bytes are not a parseable certificate.
    Unparseable(String),
    /// The certificate is inside its renewal window.
    Expiring { not_after: OffsetDateTime },
    /// The certificate no longer matches the desired spec.
    SpecChanged,
}

impl fmt::Display for RenewalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "certificate missing"),
            Self::Unparseable(err) => write!(f, "stored certificate unparseable: {err}"),
            Self::Expiring { not_after } => {
                write!(f, "certificate expires at {not_after} and is due for renewal")
            }
            Self::SpecChanged => write!(f, "certificate does not match the issuer spec"),
        }
    }
}

/// Evaluate the stored certificate against the desired preview.
///
/// Checks run in order: missing, unparseable, expiry (`now >= NotAfter -
/// renew_before`, inclusive), then serial mismatch. Returns `None` when the
/// stored certificate is still good.
pub fn evaluate_renewal(
    stored: &[u8],
    desired: &CertificatePreview,
    renew_before: Duration,
    now: OffsetDateTime,
) -> Option<RenewalReason> {
    if stored.is_empty() {
        return Some(RenewalReason::Missing);
    }

    let parsed = match parse_certificate_pem(stored) {
        Ok(parsed) => parsed,
        Err(e) => return Some(RenewalReason::Unparseable(e.to_string())),
    };

    if now >= parsed.not_after - renew_before {
        return Some(RenewalReason::Expiring {
            not_after: parsed.not_after,
        });
    }

    if parsed.serial != desired.serial {
        return Some(RenewalReason::SpecChanged);
    }

    None
}

/// Shorthand for [`evaluate_renewal`] returning only the verdict.
pub fn certificate_needs_renewal(
    stored: &[u8],
    desired: &CertificatePreview,
    renew_before: Duration,
    now: OffsetDateTime,
) -> bool {
    evaluate_renewal(stored, desired, renew_before, now).is_some()
}
