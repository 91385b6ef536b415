//! Configuration Module
//!
//! Handles loading configuration from:
//! 1. ~/.shroud/config.toml (if exists)
//! 2. Environment variables (override TOML values)
//!
//! Environment variables take precedence over TOML config. Amounts are
//! smallest-unit integers written as decimal strings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shroud_privacy::Amount;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use crate::error::ValidationError;
use crate::orchestrator::RetryPolicy;
use crate::state::PrivacyMode;

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub settings: PrivacySettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub proving: ProvingConfig,
    #[serde(default)]
    pub alias: AliasConfig,
}

/// Runtime privacy settings
///
/// Loaded from `[settings]`, persisted alongside the engine state, and
/// changed only through explicit configuration calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(default)]
    pub mode: PrivacyMode,
    /// Smallest deposit accepted into the pool
    #[serde(default = "default_min_mix_amount", with = "shroud_privacy::amount")]
    pub min_mix_amount: Amount,
    /// Largest deposit accepted into the pool
    #[serde(default = "default_max_mix_amount", with = "shroud_privacy::amount")]
    pub max_mix_amount: Amount,
    /// Anonymity set below which spends log a warning
    #[serde(default = "default_anonymity_set_preference")]
    pub anonymity_set_preference: u64,
    /// Fee applied when a caller does not name one
    #[serde(default, with = "shroud_privacy::amount")]
    pub default_fee: Amount,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            mode: PrivacyMode::default(),
            min_mix_amount: default_min_mix_amount(),
            max_mix_amount: default_max_mix_amount(),
            anonymity_set_preference: default_anonymity_set_preference(),
            default_fee: 0,
        }
    }
}

impl PrivacySettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_mix_amount == 0 {
            return Err(ValidationError::InvalidSettings("min_mix_amount must be positive"));
        }
        if self.min_mix_amount > self.max_mix_amount {
            return Err(ValidationError::InvalidSettings(
                "min_mix_amount exceeds max_mix_amount",
            ));
        }
        Ok(())
    }
}

/// 0.01 in an 18-decimal unit
fn default_min_mix_amount() -> Amount {
    10_000_000_000_000_000
}

/// 100 in an 18-decimal unit
fn default_max_mix_amount() -> Amount {
    100_000_000_000_000_000_000
}

fn default_anonymity_set_preference() -> u64 {
    64
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./shroud-db".to_string()
}

/// Proof generation retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvingConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for ProvingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    250
}

/// Alias creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConfig {
    /// Value locked in each alias's bonding commitment
    #[serde(default, with = "shroud_privacy::amount")]
    pub bond_value: Amount,
}

impl ShroudConfig {
    /// Load configuration from ~/.shroud/config.toml with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::find_config_file() {
            log::info!("Loading config from: {}", config_path.display());
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            config = Self::parse(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;
        } else {
            log::info!("No config file found, using defaults and environment variables");
        }

        config.apply_overrides(|key| env::var(key).ok());
        config
            .settings
            .validate()
            .context("Invalid [settings] section")?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHROUD_CONFIG env var
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ~/.shroud/config.toml
        if let Some(config_path) = Self::default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        None
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Database
        if let Some(v) = lookup("SHROUD_DB_PATH") {
            self.database.path = v;
        }

        // Settings
        if let Some(mode) = lookup("SHROUD_PRIVACY_MODE").and_then(|v| v.parse().ok()) {
            self.settings.mode = mode;
        }
        if let Some(n) = lookup("SHROUD_MIN_MIX_AMOUNT").and_then(|v| v.parse().ok()) {
            self.settings.min_mix_amount = n;
        }
        if let Some(n) = lookup("SHROUD_MAX_MIX_AMOUNT").and_then(|v| v.parse().ok()) {
            self.settings.max_mix_amount = n;
        }

        // Proving
        if let Some(n) = lookup("SHROUD_PROOF_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.proving.max_retries = n;
        }
        if let Some(n) = lookup("SHROUD_PROOF_RETRY_BASE_MS").and_then(|v| v.parse().ok()) {
            self.proving.retry_base_ms = n;
        }
    }

    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.proving.max_retries,
            base_delay: Duration::from_millis(self.proving.retry_base_ms),
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let sample = Self {
            settings: PrivacySettings {
                mode: PrivacyMode::Private,
                ..PrivacySettings::default()
            },
            alias: AliasConfig {
                bond_value: 1_000_000_000_000_000,
            },
            ..Self::default()
        };

        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}
