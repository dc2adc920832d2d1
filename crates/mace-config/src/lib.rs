// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime configuration for the MACE core.
//!
//! Settings come from a TOML file, then `MACE_*` environment overrides on
//! top. The core only asks two things of a storage backend — single-row
//! upsert-by-key and append — so the storage URL names a SQLite file today
//! and a network-SQL backend is a drop-in behind the same contract.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// The storage URL names a backend this build does not support.
    #[error("unsupported storage scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// The offending scheme.
        scheme: String,
        /// The full URL.
        url: String,
    },
}

/// Advisory issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Development signing secrets are enabled.
    DevSecretsEnabled,
    /// The artifact directory is nested under the storage directory.
    ArtifactsInsideStorage,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DevSecretsEnabled => {
                write!(f, "development signing secrets are enabled; not for production")
            }
            ConfigWarning::ArtifactsInsideStorage => {
                write!(f, "artifact directory sits inside the storage directory")
            }
        }
    }
}

/// Storage settings for the durable tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Backend URL; `sqlite://<path>` or a bare filesystem path.
    pub url: String,
}

impl StorageSettings {
    /// Resolve the SQLite database file behind the URL.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedScheme`] for URLs naming another backend.
    pub fn sqlite_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = self.url.strip_prefix("sqlite://") {
            return Ok(PathBuf::from(path));
        }
        if let Some((scheme, _)) = self.url.split_once("://") {
            return Err(ConfigError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: self.url.clone(),
            });
        }
        Ok(PathBuf::from(&self.url))
    }
}

/// Signing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSettings {
    /// Key id used for reflective log signatures.
    pub key_id: String,
    /// Whether missing secrets may fall back to development values.
    pub allow_dev_secrets: bool,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaceConfig {
    /// Durable table backend.
    pub storage: StorageSettings,
    /// Directory for content-addressed artifact blobs.
    pub artifacts_dir: String,
    /// Path of the semantic-memory write journal.
    pub journal_path: String,
    /// Signing policy.
    pub signing: SigningSettings,
    /// Log level override (e.g. `"debug"`, `"info"`).
    pub log_level: Option<String>,
}

impl Default for MaceConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings {
                url: "sqlite://mace.db".to_string(),
            },
            artifacts_dir: "artifacts".to_string(),
            journal_path: "logs/sem_write_journal.ndjson".to_string(),
            signing: SigningSettings {
                key_id: "reflective_log_key".to_string(),
                allow_dev_secrets: false,
            },
            log_level: None,
        }
    }
}

impl MaceConfig {
    /// Load from a TOML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileNotFound`] or [`ConfigError::ParseError`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut config: Self = toml::from_str(&body).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides, with no file involved.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `MACE_*` environment variables over the current values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MACE_DB_URL") {
            self.storage.url = url;
        }
        if let Ok(dir) = std::env::var("MACE_ARTIFACTS_DIR") {
            self.artifacts_dir = dir;
        }
        if let Ok(path) = std::env::var("MACE_JOURNAL_PATH") {
            self.journal_path = path;
        }
        if let Ok(flag) = std::env::var("MACE_ALLOW_DEV_SECRETS") {
            self.signing.allow_dev_secrets = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }

    /// Validate and collect advisory warnings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedScheme`] for an unusable storage URL.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let db_path = self.storage.sqlite_path()?;
        let mut warnings = Vec::new();
        if self.signing.allow_dev_secrets {
            warnings.push(ConfigWarning::DevSecretsEnabled);
        }
        if let Some(storage_dir) = db_path.parent() {
            if !storage_dir.as_os_str().is_empty()
                && Path::new(&self.artifacts_dir).starts_with(storage_dir)
            {
                warnings.push(ConfigWarning::ArtifactsInsideStorage);
            }
        }
        for warning in &warnings {
            tracing::warn!(%warning, "config warning");
        }
        Ok(warnings)
    }
}
