//! Deterministic certificate previews.
//!
//! `not_before` is the request instant floored to a multiple of the rounding
//! window (counted from the Unix epoch), `not_after` is `not_before + duration`,
//! and the serial number is a digest of the request identity and validity.
//! Inside one rounding window every preview of the same spec is identical.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::engine::CertificateRequest;
use crate::error::{CaError, CaResult};

/// Maximum serial number length allowed by RFC 5280.
const SERIAL_LEN: usize = 20;

/// Positive certificate serial number in minimal big-endian form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    /// Builds a serial from big-endian bytes, dropping leading zero bytes so
    /// DER sign padding does not affect equality.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let start = bytes
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({self})")
    }
}

/// Serial number and validity the engine would issue for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePreview {
    pub serial: SerialNumber,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Compute the preview for a request.
///
/// # Errors
///
/// Returns `CaError::InvalidRequest` for a non-positive duration or a validity
/// window outside the representable date range.
pub fn preview_certificate(request: &CertificateRequest) -> CaResult<CertificatePreview> {
    let duration = Duration::seconds(request.duration.whole_seconds());
    if duration <= Duration::ZERO {
        return Err(CaError::invalid_request(format!(
            "duration must be positive, got {}",
            request.duration
        )));
    }

    let not_before = floor_to_window(request.at, request.rounding)?;
    let not_after = not_before
        .checked_add(duration)
        .ok_or_else(|| CaError::invalid_request("validity end is out of range"))?;

    let serial = derive_serial(
        &request.key_reference,
        &request.subject.common_name,
        duration,
        not_before,
        not_after,
    );

    Ok(CertificatePreview {
        serial,
        not_before,
        not_after,
    })
}

/// Floor `at` to whole seconds, then to a multiple of `window` when it is positive.
fn floor_to_window(at: OffsetDateTime, window: Duration) -> CaResult<OffsetDateTime> {
    let secs = at.unix_timestamp();
    let window = window.whole_seconds();
    let floored = if window > 0 {
        secs - secs.rem_euclid(window)
    } else {
        secs
    };
    OffsetDateTime::from_unix_timestamp(floored)
        .map_err(|e| CaError::invalid_request(format!("validity start is out of range: {e}")))
}

fn derive_serial(
    key_reference: &str,
    common_name: &str,
    duration: Duration,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> SerialNumber {
    let mut hasher = Sha256::new();
    hasher.update(key_reference.as_bytes());
    hasher.update([0u8]);
    hasher.update(common_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(duration.whole_seconds().to_be_bytes());
    hasher.update(not_before.unix_timestamp().to_be_bytes());
    hasher.update(not_after.unix_timestamp().to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; SERIAL_LEN];
    bytes.copy_from_slice(&digest[..SERIAL_LEN]);
    // Keep the INTEGER positive without a padding byte
    bytes[0] &= 0x7f;

    let serial = SerialNumber::from_bytes(&bytes);
    if serial.as_bytes().is_empty() {
        SerialNumber(vec![1])
    } else {
        serial
    }
}
