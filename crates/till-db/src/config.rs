//! # Till Configuration
//!
//! Configuration for the database pool and ledger policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_DB_PATH=/var/lib/till/till.db                                 │
//! │     TILL_DB_MAX_CONNECTIONS=8                                          │
//! │     TILL_STOCK_POLICY=reject_insufficient                              │
//! │     TILL_SALE_NUMBER_PREFIX=V                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     explicit path, or ~/.config/till/till.toml (Linux)                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/till/till.db"
//! max_connections = 8
//! busy_timeout_secs = 5
//!
//! [ledger]
//! stock_policy = "allow_negative"   # allow_negative | reject_insufficient
//! sale_number_prefix = "V"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;
use till_core::StockPolicy;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a writer waits for the write lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "till", "till")
        .map(|dirs| dirs.data_dir().join("till.db"))
        .unwrap_or_else(|| PathBuf::from("till.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// What a completed sale does when stock would go below zero.
    #[serde(default)]
    pub stock_policy: StockPolicy,

    /// Leading text of every sale number.
    #[serde(default = "default_sale_number_prefix")]
    pub sale_number_prefix: String,
}

fn default_sale_number_prefix() -> String {
    "V".to_string()
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            stock_policy: StockPolicy::default(),
            sale_number_prefix: default_sale_number_prefix(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TillConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl TillConfig {
    /// Loads configuration: defaults, then file, then environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading till config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing tables and keys take defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks the values that would otherwise fail later and less clearly.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }

        let prefix = &self.ledger.sale_number_prefix;
        if prefix.len() > 8 || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::Invalid(format!(
                "ledger.sale_number_prefix must be up to 8 letters, digits or '-', got '{}'",
                prefix
            )));
        }

        Ok(())
    }

    /// The pool configuration these settings describe.
    pub fn database_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    /// `till.toml` in the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "till")
            .map(|dirs| dirs.config_dir().join("till.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TILL_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TILL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("TILL_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %max, "Ignoring invalid TILL_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(policy) = lookup("TILL_STOCK_POLICY") {
            match policy.parse::<StockPolicy>() {
                Ok(policy) => self.ledger.stock_policy = policy,
                Err(e) => warn!(error = %e, "Ignoring invalid TILL_STOCK_POLICY"),
            }
        }

        if let Some(prefix) = lookup("TILL_SALE_NUMBER_PREFIX") {
            self.ledger.sale_number_prefix = prefix;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = TillConfig::default();
        assert_eq!(config.ledger.stock_policy, StockPolicy::AllowNegative);
        assert_eq!(config.ledger.sale_number_prefix, "V");
        assert_eq!(config.database.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = TillConfig::from_toml(
            r#"
            [database]
            path = "/tmp/till-test.db"
            busy_timeout_secs = 2

            [ledger]
            stock_policy = "reject_insufficient"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/till-test.db"));
        assert_eq!(config.database.busy_timeout_secs, 2);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.ledger.stock_policy, StockPolicy::RejectInsufficient);
        assert_eq!(config.ledger.sale_number_prefix, "V");

        let db = config.database_config();
        assert_eq!(db.busy_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_policy_rejected_in_file() {
        let result = TillConfig::from_toml("[ledger]\nstock_policy = \"sometimes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TILL_DB_PATH", "/data/till.db"),
            ("TILL_DB_MAX_CONNECTIONS", "12"),
            ("TILL_STOCK_POLICY", "reject"),
            ("TILL_SALE_NUMBER_PREFIX", "T"),
        ]
        .into_iter()
        .collect();

        let mut config = TillConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/till.db"));
        assert_eq!(config.database.max_connections, 12);
        assert_eq!(config.ledger.stock_policy, StockPolicy::RejectInsufficient);
        assert_eq!(config.ledger.sale_number_prefix, "T");
    }

    #[test]
    fn test_invalid_override_ignored() {
        let mut config = TillConfig::default();
        config.apply_overrides(|key| match key {
            "TILL_DB_MAX_CONNECTIONS" => Some("many".to_string()),
            _ => None,
        });
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_validation() {
        let mut config = TillConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = TillConfig::default();
        config.ledger.sale_number_prefix = "has space".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_tables() {
        let toml_str = TillConfig::default().to_toml().unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[ledger]"));
        assert!(toml_str.contains("allow_negative"));
    }
}
