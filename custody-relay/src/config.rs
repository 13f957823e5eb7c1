//! Relay configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CUSTODY_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger configuration.
    pub ledger: LedgerConfig,
    /// Relay configuration.
    pub relay: RelayConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("CUSTODY_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.ledger.apply_env_overrides();
        self.relay.apply_env_overrides();
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.package_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "relay.package_id must be set (CUSTODY_PACKAGE)".to_string(),
            ));
        }
        if self.relay.channel.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "relay.channel must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Ledger storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the ledger journal.
    pub data_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl LedgerConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CUSTODY_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Package whose event log the relay observes.
    pub package_id: String,
    /// Downstream channel identifier messages are addressed to.
    pub channel: String,
    /// Downstream publish target. When unset, envelopes are logged instead.
    #[serde(with = "opt_socket_addr_serde")]
    pub target_addr: Option<SocketAddr>,
    /// Access credential for the downstream channel.
    pub access_token: Option<String>,
    /// Event sequence to start observing from.
    pub start_from: u64,
    /// Seconds between publish retries.
    pub retry_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            package_id: String::new(),
            channel: "custody-events".to_string(),
            target_addr: None,
            access_token: None,
            start_from: 0,
            retry_interval_secs: 5,
        }
    }
}

impl RelayConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(package) = std::env::var("CUSTODY_PACKAGE") {
            if !package.is_empty() {
                self.package_id = package;
            }
        }

        if let Ok(channel) = std::env::var("CUSTODY_CHANNEL") {
            if !channel.is_empty() {
                self.channel = channel;
            }
        }

        if let Ok(addr) = std::env::var("CUSTODY_TARGET") {
            if let Ok(parsed) = addr.parse() {
                self.target_addr = Some(parsed);
            }
        }

        if let Ok(token) = std::env::var("CUSTODY_ACCESS_TOKEN") {
            if !token.is_empty() {
                self.access_token = Some(token);
            }
        }

        if let Ok(from) = std::env::var("CUSTODY_START_FROM") {
            if let Ok(n) = from.parse() {
                self.start_from = n;
            }
        }

        if let Ok(interval) = std::env::var("CUSTODY_RETRY_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.retry_interval_secs = secs;
            }
        }
    }

    /// Returns the retry interval as a Duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for Option<SocketAddr> (as a string in YAML).
mod opt_socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &Option<SocketAddr>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match addr {
            Some(addr) => serializer.serialize_some(&addr.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SocketAddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ledger.data_dir, PathBuf::from("./data"));
        assert_eq!(config.relay.channel, "custody-events");
        assert_eq!(config.relay.start_from, 0);
        assert_eq!(config.relay.retry_interval(), Duration::from_secs(5));
        assert!(config.relay.target_addr.is_none());
    }

    #[test]
    fn test_validation_requires_package() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.package_id = "1".to_string();
        assert!(config.validate().is_ok());

        config.relay.channel = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.relay.package_id = "1".to_string();
        config.relay.target_addr = Some("127.0.0.1:7500".parse().unwrap());
        config.relay.access_token = Some("secret".to_string());

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.relay.package_id, config.relay.package_id);
        assert_eq!(parsed.relay.target_addr, config.relay.target_addr);
        assert_eq!(parsed.relay.access_token, config.relay.access_token);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "relay:\n  package_id: \"42\"\n  channel: shipments\n  start_from: 7\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.relay.package_id, "42");
        assert_eq!(config.relay.channel, "shipments");
        assert_eq!(config.relay.start_from, 7);
        // Unspecified sections keep their defaults.
        assert_eq!(config.ledger.data_dir, PathBuf::from("./data"));
    }
}
