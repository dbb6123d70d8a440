//! Issuer manifests used to seed a store.
//!
//! ```toml
//! [[issuer]]
//! namespace = "default"
//! name = "root-ca"
//!
//! [issuer.spec]
//! keyReference = "k1"
//! commonName = "ca.example"
//! duration = "PT1H"
//! ```

use std::collections::HashSet;
use std::path::Path;

use caissuer_core::{Issuer, IssuerSpec};
use caissuer_storage::{DynIssuerStore, IssuerStore};
use serde::Deserialize;

use crate::error::ManifestError;

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    issuer: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default = "default_namespace")]
    namespace: String,
    name: String,
    #[serde(default)]
    spec: IssuerSpec,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}

/// Parse a manifest into issuers. Keys must be unique.
pub fn parse_manifest(content: &str) -> Result<Vec<Issuer>, ManifestError> {
    let manifest: Manifest = toml::from_str(content)?;
    let mut seen = HashSet::new();
    let mut issuers = Vec::with_capacity(manifest.issuer.len());

    for entry in manifest.issuer {
        if entry.name.trim().is_empty() || entry.namespace.trim().is_empty() {
            return Err(ManifestError::Invalid(
                "issuer name and namespace must not be empty".into(),
            ));
        }
        let issuer = Issuer::new(entry.namespace, entry.name, entry.spec);
        if !seen.insert(issuer.key()) {
            return Err(ManifestError::Invalid(format!(
                "duplicate issuer {}",
                issuer.key()
            )));
        }
        issuers.push(issuer);
    }
    Ok(issuers)
}

pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<Issuer>, ManifestError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifest(&content)
}

/// Apply every issuer of the manifest to `store`. Returns the number applied.
pub async fn seed_store(
    store: &DynIssuerStore,
    issuers: Vec<Issuer>,
) -> Result<usize, caissuer_storage::StorageError> {
    let count = issuers.len();
    for issuer in issuers {
        let key = issuer.key();
        let stored = store.apply(issuer).await?;
        tracing::debug!(issuer = %key, generation = stored.metadata.generation, "issuer applied");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_parse_manifest() {
        let issuers = parse_manifest(
            r#"
            [[issuer]]
            name = "root-ca"
            [issuer.spec]
            keyReference = "k1"
            commonName = "ca.example"
            duration = "PT1H"

            [[issuer]]
            namespace = "team-a"
            name = "team-ca"
            [issuer.spec]
            keyReference = "k2"
            commonName = "team.example"
            renewBefore = "PT10M"
            "#,
        )
        .unwrap();

        assert_eq!(issuers.len(), 2);
        assert_eq!(issuers[0].key().to_string(), "default/root-ca");
        assert_eq!(issuers[0].spec.duration, Some(Duration::hours(1)));
        assert_eq!(issuers[0].spec.renew_before, None);
        assert_eq!(issuers[1].metadata.namespace, "team-a");
        assert_eq!(issuers[1].spec.renew_before, Some(Duration::minutes(10)));
    }

    #[test]
    fn test_empty_manifest() {
        assert!(parse_manifest("").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = parse_manifest(
            r#"
            [[issuer]]
            name = "a"
            [[issuer]]
            name = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(ref m) if m.contains("default/a")));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = parse_manifest(
            r#"
            [[issuer]]
            name = "a"
            [issuer.spec]
            duration = "1 hour"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_manifest("/nonexistent/issuers.toml"),
            Err(ManifestError::Io { .. })
        ));
    }
}
