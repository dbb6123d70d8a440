use caissuer_core::time::iso_duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::controller::ControllerConfig;
use crate::reconcile::{RenewalPolicy, DEFAULT_CERT_DURATION, DEFAULT_RENEWAL_RATIO};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "caissuer.toml";

/// Prefix of environment overrides, e.g. `CAISSUER__CONTROLLER__WORKERS=8`.
pub const ENV_PREFIX: &str = "CAISSUER";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub renewal: RenewalSettings,
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub ca: CaSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Renewal validations
        if self.renewal.default_duration <= time::Duration::ZERO {
            return Err("renewal.default_duration must be > 0".into());
        }
        let ratio = self.renewal.renewal_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err("renewal.renewal_ratio must be in (0, 1]".into());
        }
        // Controller validations
        if self.controller.workers == 0 {
            return Err("controller.workers must be > 0".into());
        }
        if self.controller.backoff_base_ms == 0 {
            return Err("controller.backoff_base_ms must be > 0".into());
        }
        if self.controller.backoff_max_ms < self.controller.backoff_base_ms {
            return Err("controller.backoff_max_ms must be >= controller.backoff_base_ms".into());
        }
        // CA key validations
        for key in &self.ca.keys {
            if key.id.trim().is_empty() {
                return Err("ca.keys[].id must not be empty".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn renewal_policy(&self) -> Result<RenewalPolicy, String> {
        RenewalPolicy::new(self.renewal.default_duration, self.renewal.renewal_ratio)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.controller.workers,
            backoff_base: std::time::Duration::from_millis(self.controller.backoff_base_ms),
            backoff_max: std::time::Duration::from_millis(self.controller.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalSettings {
    /// Certificate validity applied when an issuer leaves `duration` unset.
    #[serde(default = "default_cert_duration", with = "iso_duration")]
    pub default_duration: time::Duration,
    /// Fraction of the validity used as `renewBefore` when unset.
    #[serde(default = "default_renewal_ratio")]
    pub renewal_ratio: f64,
}

fn default_cert_duration() -> time::Duration {
    DEFAULT_CERT_DURATION
}
fn default_renewal_ratio() -> f64 {
    DEFAULT_RENEWAL_RATIO
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            default_duration: default_cert_duration(),
            renewal_ratio: default_renewal_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Maximum number of issuers reconciled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_workers() -> usize {
    4
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    300_000
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaSettings {
    /// Generate a key the first time an unknown key reference is used.
    #[serde(default = "default_generate_missing_keys")]
    pub generate_missing_keys: bool,
    /// Signing keys loaded from PKCS#8 PEM files at startup.
    #[serde(default)]
    pub keys: Vec<CaKeyConfig>,
}

fn default_generate_missing_keys() -> bool {
    true
}

impl Default for CaSettings {
    fn default() -> Self {
        Self {
            generate_missing_keys: default_generate_missing_keys(),
            keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaKeyConfig {
    /// Key reference issuers use to select this key.
    pub id: String,
    pub pem_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., CAISSUER__CONTROLLER__WORKERS=8
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
