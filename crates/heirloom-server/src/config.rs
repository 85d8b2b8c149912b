//! Node configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use heirloom_core::{Address, InheritanceParams};
use heirloom_engine::HeartbeatConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the node database inside `data_dir`.
pub const DB_FILE: &str = "heirloom.db";

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// General node settings
    #[serde(default)]
    pub server: ServerSection,

    /// Protocol parameters. `fallback_recipient` has no default.
    pub protocol: InheritanceParams,

    /// Owner check-in thresholds
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// General node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Data directory (SQLite DB)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds between steps
    #[serde(default = "default_step_interval")]
    pub step_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            step_interval_secs: default_step_interval(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_step_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `HEIRLOOM_DATA_DIR`
    /// - `HEIRLOOM_STEP_INTERVAL`
    /// - `HEIRLOOM_LOG_LEVEL`
    /// - `HEIRLOOM_FALLBACK_RECIPIENT`
    /// - `HEIRLOOM_ADDRESS_PREFIX`
    /// - `HEIRLOOM_NATIVE_DENOM`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HEIRLOOM_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HEIRLOOM_STEP_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.step_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("HEIRLOOM_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("HEIRLOOM_FALLBACK_RECIPIENT") {
            self.protocol.fallback_recipient = Address::new(v);
        }
        if let Ok(v) = std::env::var("HEIRLOOM_ADDRESS_PREFIX") {
            self.protocol.address_prefix = v;
        }
        if let Ok(v) = std::env::var("HEIRLOOM_NATIVE_DENOM") {
            self.protocol.native_denom = v;
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.server.step_interval_secs >= 1,
            "server.step_interval_secs must be >= 1"
        );

        self.protocol
            .validate()
            .context("invalid [protocol] section")?;
        self.heartbeat
            .validate()
            .context("invalid [heartbeat] section")?;

        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join(DB_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::params::{MIN_GRACE_PERIOD, SECONDS_PER_DAY};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[protocol]
fallback_recipient = "heir1charity"
"#
    }

    fn full_toml() -> &'static str {
        r#"
[server]
data_dir = "/custom/data"
step_interval_secs = 10
log_level = "debug"

[protocol]
min_grace_period = 5184000
max_beneficiaries = 4
min_inactivity_period = 604800
min_claim_window = 172800
dormancy_period = 3153600000
fallback_recipient = "heir1charity"
native_denom = "utest"
address_prefix = "heir1"

[heartbeat]
checkin_threshold = 0.6
critical_threshold = 0.95
"#
    }

    fn load(toml: &str) -> ServerConfig {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        ServerConfig::from_file(file.path()).unwrap()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = load(minimal_toml());
        assert_eq!(config.protocol.fallback_recipient, Address::from("heir1charity"));
        assert_eq!(config.protocol.min_grace_period, MIN_GRACE_PERIOD);
        assert_eq!(config.protocol.min_claim_window, SECONDS_PER_DAY);
        assert_eq!(config.server.step_interval_secs, 5);
        assert_eq!(config.server.data_dir, PathBuf::from("/data"));
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = load(full_toml());

        assert_eq!(config.server.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server.step_interval_secs, 10);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.protocol.min_grace_period, 60 * SECONDS_PER_DAY);
        assert_eq!(config.protocol.max_beneficiaries, 4);
        assert_eq!(config.protocol.native_denom, "utest");
        assert_eq!(config.heartbeat.checkin_threshold, 0.6);
        assert_eq!(config.db_path(), PathBuf::from("/custom/data/heirloom.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fallback_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[server]\nstep_interval_secs = 5\n").unwrap();
        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = load(minimal_toml());

        std::env::set_var("HEIRLOOM_DATA_DIR", "/env/data");
        std::env::set_var("HEIRLOOM_STEP_INTERVAL", "30");
        std::env::set_var("HEIRLOOM_FALLBACK_RECIPIENT", "heir1treasury");

        config.apply_env_overrides();

        assert_eq!(config.server.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.server.step_interval_secs, 30);
        assert_eq!(config.protocol.fallback_recipient, Address::from("heir1treasury"));

        std::env::remove_var("HEIRLOOM_DATA_DIR");
        std::env::remove_var("HEIRLOOM_STEP_INTERVAL");
        std::env::remove_var("HEIRLOOM_FALLBACK_RECIPIENT");
    }

    #[test]
    fn test_validation_zero_interval() {
        let config = load(
            r#"
[server]
step_interval_secs = 0

[protocol]
fallback_recipient = "heir1charity"
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_fallback() {
        let config = load(
            r#"
[protocol]
fallback_recipient = "cosmos1charity"
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_inverted_thresholds() {
        let config = load(
            r#"
[protocol]
fallback_recipient = "heir1charity"

[heartbeat]
checkin_threshold = 0.9
critical_threshold = 0.5
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = load(full_toml());
        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: ServerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.protocol, config.protocol);
        assert_eq!(reparsed.server.step_interval_secs, 10);
    }
}
