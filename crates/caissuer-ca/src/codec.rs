//! PEM encoding and X.509 parsing of CA certificates.

use ::time::OffsetDateTime;
use x509_parser::prelude::*;

use crate::error::{CaError, CaResult};
use crate::preview::SerialNumber;

/// PEM block type for certificates.
pub const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

/// Fields of a stored certificate the controller cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub serial: SerialNumber,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub common_name: Option<String>,
    pub is_ca: bool,
}

/// Wrap DER certificate bytes in a `CERTIFICATE` PEM block.
pub fn encode_certificate_pem(der: &[u8]) -> String {
    ::pem::encode(&::pem::Pem::new(CERTIFICATE_PEM_TAG, der.to_vec()))
}

/// Decode the first PEM block of `bytes` and parse it as an X.509 certificate.
///
/// # Errors
///
/// Returns `CaError::Parse` when no PEM block is present, the block is not a
/// certificate, or the DER payload is malformed.
pub fn parse_certificate_pem(bytes: &[u8]) -> CaResult<ParsedCertificate> {
    let block = ::pem::parse(bytes)
        .map_err(|e| CaError::parse(format!("failed to parse certificate PEM: {e}")))?;
    if block.tag() != CERTIFICATE_PEM_TAG {
        return Err(CaError::parse(format!(
            "unexpected PEM block type: {}",
            block.tag()
        )));
    }
    parse_certificate_der(block.contents())
}

/// Parse DER certificate bytes.
pub fn parse_certificate_der(der: &[u8]) -> CaResult<ParsedCertificate> {
    let (rest, cert) = parse_x509_certificate(der)
        .map_err(|e| CaError::parse(format!("failed to parse certificate DER: {e}")))?;
    if !rest.is_empty() {
        return Err(CaError::parse("trailing data after certificate"));
    }

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    Ok(ParsedCertificate {
        serial: SerialNumber::from_bytes(cert.raw_serial()),
        not_before: cert.validity().not_before.to_datetime(),
        not_after: cert.validity().not_after.to_datetime(),
        common_name,
        is_ca: cert.is_ca(),
    })
}
