//! Configuration for the encryption module.
//!
//! Loaded from:
//! - a TOML file (`MALAKA_E2E_CONFIG`, default `~/.config/malaka-e2e/e2e.toml`)
//! - environment variables (`MALAKA_E2E_*`) when no file exists
//!
//! ```toml
//! device_label = "work-laptop"
//!
//! [store]
//! backend = "file"
//! path = "${HOME}/.local/share/malaka-e2e/keys"
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::directory::DEFAULT_DEVICE_LABEL;
use crate::error::E2eResult;
use crate::key_storage::{FileKeyStore, KeyStore, MemoryKeyStore};

/// Overrides the config file location.
pub const ENV_CONFIG: &str = "MALAKA_E2E_CONFIG";
/// Store backend, `memory` or `file`.
pub const ENV_STORE: &str = "MALAKA_E2E_STORE";
/// Directory of the file store.
pub const ENV_STORE_PATH: &str = "MALAKA_E2E_STORE_PATH";
/// Device label sent with public key uploads.
pub const ENV_DEVICE_LABEL: &str = "MALAKA_E2E_DEVICE_LABEL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid store backend: {0}")]
    InvalidBackend(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Key store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Key store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory of the file store. Ignored by the memory backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// `~/.local/share/malaka-e2e/keys` or the platform equivalent.
pub fn default_store_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
    path.push("malaka-e2e");
    path.push("keys");
    path
}

impl StoreConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.backend == StoreBackend::File && self.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "file store path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the configured backend.
    ///
    /// A file store is checked for read/write access up front so a bad
    /// path fails at startup rather than on the first key write.
    pub async fn open(&self) -> E2eResult<Arc<dyn KeyStore>> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryKeyStore::new())),
            StoreBackend::File => {
                let store = FileKeyStore::new(&self.path);
                store.validate().await?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_device_label")]
    pub device_label: String,
}

fn default_device_label() -> String {
    DEFAULT_DEVICE_LABEL.to_string()
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            device_label: default_device_label(),
        }
    }
}

impl E2eConfig {
    /// `MALAKA_E2E_CONFIG`, or `~/.config/malaka-e2e/e2e.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        path.push("malaka-e2e");
        path.push("e2e.toml");
        path
    }

    /// Load from the config file if it exists, otherwise from the
    /// environment. The result is validated.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_config_path();

        let config = if path.exists() {
            info!("Loading e2e config from: {}", path.display());
            Self::from_file(&path)?
        } else {
            debug!(
                "Config file not found at {}, using environment variables",
                path.display()
            );
            Self::from_env()?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, substituting `${VAR}` placeholders.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let content = substitute_env_vars(content)?;
        Ok(toml::from_str(&content)?)
    }

    /// Build from `MALAKA_E2E_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let backend = match lookup(ENV_STORE) {
            Some(value) => value.parse()?,
            None => StoreBackend::default(),
        };
        let path = lookup(ENV_STORE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);
        let device_label = lookup(ENV_DEVICE_LABEL).unwrap_or_else(default_device_label);

        Ok(Self {
            store: StoreConfig { backend, path },
            device_label,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.device_label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "device_label cannot be empty".to_string(),
            ));
        }
        self.store.validate()
    }
}

/// Replace `${VAR}` with the variable's value; unset variables are left
/// as written.
fn substitute_env_vars(content: &str) -> ConfigResult<String> {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string())
}
