//! In-process CA engine backed by a keyring of rcgen key pairs.
//!
//! Key references are looked up in a [`Keyring`]. Keys are either loaded from
//! PKCS#8 PEM files up front or, when enabled, generated the first time a key
//! reference is used. Generated keys live only as long as the process.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyPair,
    KeyUsagePurpose,
};

use crate::engine::{CaEngine, CertificateRequest, SignedCertificate};
use crate::error::{CaError, CaResult};
use crate::preview::{preview_certificate, CertificatePreview};

/// Signing keys addressed by key reference.
pub struct Keyring {
    keys: DashMap<String, Arc<KeyPair>>,
    generate_missing: bool,
}

impl Keyring {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            generate_missing: false,
        }
    }

    /// Generate a fresh key the first time an unknown reference is used.
    pub fn with_generate_missing(mut self, generate_missing: bool) -> Self {
        self.generate_missing = generate_missing;
        self
    }

    /// Register a key from PKCS#8 PEM text.
    pub fn insert_pem(&self, key_reference: impl Into<String>, key_pem: &str) -> CaResult<()> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| CaError::Key(format!("failed to parse key: {e}")))?;
        self.keys.insert(key_reference.into(), Arc::new(key_pair));
        Ok(())
    }

    /// Register a key from a PKCS#8 PEM file.
    pub fn load_pem_file(
        &self,
        key_reference: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> CaResult<()> {
        let key_pem = std::fs::read_to_string(path.as_ref())?;
        self.insert_pem(key_reference, &key_pem)
    }

    pub fn contains(&self, key_reference: &str) -> bool {
        self.keys.contains_key(key_reference)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn resolve(&self, key_reference: &str) -> CaResult<Arc<KeyPair>> {
        if let Some(key) = self.keys.get(key_reference) {
            return Ok(Arc::clone(key.value()));
        }
        if !self.generate_missing {
            return Err(CaError::key_not_found(key_reference));
        }

        let entry = self
            .keys
            .entry(key_reference.to_string())
            .or_try_insert_with(|| {
                tracing::info!(key_reference, "generating signing key");
                KeyPair::generate()
                    .map(Arc::new)
                    .map_err(|e| CaError::Key(format!("failed to generate key: {e}")))
            })?;
        Ok(Arc::clone(entry.value()))
    }
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

/// CA engine that self-signs CA certificates with keys from a [`Keyring`].
pub struct LocalCaEngine {
    keyring: Arc<Keyring>,
}

impl LocalCaEngine {
    pub fn new(keyring: Arc<Keyring>) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    fn certificate_params(
        request: &CertificateRequest,
        preview: &CertificatePreview,
    ) -> CertificateParams {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(request.subject.common_name.clone()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        params.serial_number = Some(rcgen::SerialNumber::from_slice(preview.serial.as_bytes()));
        params.not_before = preview.not_before;
        params.not_after = preview.not_after;
        params
    }
}

#[async_trait]
impl CaEngine for LocalCaEngine {
    fn preview(&self, request: &CertificateRequest) -> CaResult<CertificatePreview> {
        preview_certificate(request)
    }

    async fn sign_and_issue(&self, request: &CertificateRequest) -> CaResult<SignedCertificate> {
        let preview = preview_certificate(request)?;
        let key_pair = self.keyring.resolve(&request.key_reference)?;

        let params = Self::certificate_params(request, &preview);
        let cert = params
            .self_signed(&*key_pair)
            .map_err(|e| CaError::signing(format!("failed to sign CA certificate: {e}")))?;

        tracing::debug!(
            key_reference = %request.key_reference,
            serial = %preview.serial,
            not_after = %preview.not_after,
            "signed CA certificate"
        );

        Ok(SignedCertificate {
            der: cert.der().to_vec(),
            serial: preview.serial,
            not_before: preview.not_before,
            not_after: preview.not_after,
        })
    }

    fn engine_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_certificate_pem, parse_certificate_pem};
    use crate::engine::Subject;
    use time::macros::datetime;
    use time::Duration;

    fn request(key_reference: &str) -> CertificateRequest {
        CertificateRequest {
            key_reference: key_reference.into(),
            subject: Subject::new("ca.example"),
            duration: Duration::hours(1),
            rounding: Duration::minutes(20),
            at: datetime!(2024-01-01 10:47 UTC),
        }
    }

    fn engine(generate_missing: bool) -> LocalCaEngine {
        LocalCaEngine::new(Arc::new(
            Keyring::new().with_generate_missing(generate_missing),
        ))
    }

    #[tokio::test]
    async fn test_signed_certificate_matches_preview() {
        let engine = engine(true);
        let req = request("k1");
        let preview = engine.preview(&req).unwrap();
        let signed = engine.sign_and_issue(&req).await.unwrap();

        let parsed = parse_certificate_pem(encode_certificate_pem(&signed.der).as_bytes()).unwrap();
        assert_eq!(parsed.serial, preview.serial);
        assert_eq!(parsed.not_before, preview.not_before);
        assert_eq!(parsed.not_after, preview.not_after);
        assert_eq!(parsed.common_name.as_deref(), Some("ca.example"));
        assert!(parsed.is_ca);
    }

    #[tokio::test]
    async fn test_unknown_key_without_generation_fails() {
        let engine = engine(false);
        let err = engine.sign_and_issue(&request("missing")).await.unwrap_err();
        assert!(matches!(err, CaError::KeyNotFound(ref k) if k == "missing"));
    }

    #[tokio::test]
    async fn test_generated_key_is_reused() {
        let engine = engine(true);
        engine.sign_and_issue(&request("k1")).await.unwrap();
        engine.sign_and_issue(&request("k1")).await.unwrap();
        assert_eq!(engine.keyring().len(), 1);
        assert_eq!(engine.engine_name(), "local");
    }

    #[tokio::test]
    async fn test_key_loaded_from_pem_file() {
        let key_pem = KeyPair::generate().unwrap().serialize_pem();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k1.pem");
        std::fs::write(&path, key_pem).unwrap();

        let keyring = Keyring::new();
        keyring.load_pem_file("k1", &path).unwrap();
        assert!(keyring.contains("k1"));

        let engine = LocalCaEngine::new(Arc::new(keyring));
        assert!(engine.sign_and_issue(&request("k1")).await.is_ok());
    }

    #[test]
    fn test_invalid_key_pem_is_rejected() {
        let keyring = Keyring::new();
        assert!(matches!(
            keyring.insert_pem("k1", "not a key"),
            Err(CaError::Key(_))
        ));
    }
}
