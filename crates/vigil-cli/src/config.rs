//! CLI configuration (`vigil.toml`)
//!
//! ```toml
//! [engine]
//! check_in_interval_secs = 7776000
//! time_lock_secs = 604800
//!
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [store]
//! path = "vigil-store.json"
//! sealing_key_hex = "..."
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::EngineConfig;
use vigil_recovery::SealingKey;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Persistent store location and the key sealing its fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON store file; simulations stay in memory when unset
    pub path: Option<PathBuf>,
    /// 64 hex characters; required together with `path`
    pub sealing_key_hex: Option<String>,
}

impl StoreConfig {
    /// Sealing key for a file store, or a throwaway key for in-memory runs.
    pub fn sealing_key(&self) -> Result<SealingKey> {
        match (&self.path, &self.sealing_key_hex) {
            (_, Some(hex)) => SealingKey::from_hex(hex).context("Invalid [store] sealing_key_hex"),
            (Some(path), None) => bail!(
                "[store] path {} requires sealing_key_hex",
                path.display()
            ),
            (None, None) => Ok(SealingKey::generate()),
        }
    }
}

impl CliConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(source).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&source).with_context(|| format!("In {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.store.sealing_key()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}
