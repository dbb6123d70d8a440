use crate::condition::Conditions;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Duration;

/// Namespaced identity of an issuer, rendered as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(CoreError::invalid_resource_key(s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Bumped by the store whenever the spec changes.
    #[serde(default)]
    pub generation: u64,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generation: 0,
            resource_version: 0,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Desired CA certificate parameters. Authored externally, read-only to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    /// Opaque handle of the signing key.
    #[serde(default)]
    pub key_reference: String,
    #[serde(default)]
    pub common_name: String,
    /// Validity length of the issued certificate.
    #[serde(
        default,
        with = "crate::time::iso_duration_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    /// How long before expiry the certificate is reissued.
    #[serde(
        default,
        with = "crate::time::iso_duration_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub renew_before: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerStatus {
    /// PEM encoded CA certificate, replaced wholesale on renewal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl IssuerStatus {
    pub fn certificate_bytes(&self) -> &[u8] {
        self.certificate.as_deref().map(str::as_bytes).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub metadata: ObjectMeta,
    pub spec: IssuerSpec,
    #[serde(default)]
    pub status: IssuerStatus,
}

impl Issuer {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: IssuerSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: IssuerStatus::default(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.metadata.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_display_and_parse() {
        let key = ResourceKey::new("default", "root-ca");
        assert_eq!(key.to_string(), "default/root-ca");
        assert_eq!("default/root-ca".parse::<ResourceKey>().unwrap(), key);
    }

    #[test]
    fn test_resource_key_rejects_malformed() {
        for input in ["", "noslash", "/name", "ns/", "a/b/c"] {
            assert!(input.parse::<ResourceKey>().is_err(), "{input} should fail");
        }
    }

    #[test]
    fn test_spec_serialization_uses_iso_durations() {
        let spec = IssuerSpec {
            key_reference: "k1".into(),
            common_name: "ca.example".into(),
            duration: Some(Duration::hours(1)),
            renew_before: None,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["keyReference"], "k1");
        assert_eq!(json["commonName"], "ca.example");
        assert_eq!(json["duration"], "PT1H");
        assert!(json.get("renewBefore").is_none());

        let parsed: IssuerSpec = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_spec_rejects_bad_duration() {
        let json = serde_json::json!({ "keyReference": "k1", "duration": "1 hour" });
        assert!(serde_json::from_value::<IssuerSpec>(json).is_err());
    }

    #[test]
    fn test_status_certificate_bytes() {
        let mut status = IssuerStatus::default();
        assert!(status.certificate_bytes().is_empty());
        status.certificate = Some("-----BEGIN CERTIFICATE-----".into());
        assert!(status.certificate_bytes().starts_with(b"-----BEGIN"));
    }
}
