//! Configuration management for CollabNote
//!
//! This module provides environment-based configuration management with
//! support for defaults, file loading, and validation. All values here are
//! read-only inputs fixed for the process lifetime: the collaboration
//! service address, the issuer-service base address, and an optional API
//! key.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collaboration engine configuration
    pub engine: EngineConfig,

    /// Token/permission issuer service configuration
    pub issuer: IssuerConfig,

    /// Session controller configuration
    pub session: SessionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Collaboration engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// RPC address of the collaboration service
    pub rpc_addr: String,

    /// Optional API key for the collaboration service
    pub api_key: Option<String>,

    /// Timeout for opening a collaboration session
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
}

/// Issuer service configuration (permission lookup + token issuance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Base URL of the authorization/token-issuing service
    pub base_url: String,

    /// Per-request timeout for issuer HTTP calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the engine event channel
    pub event_buffer: usize,

    /// Tick interval for the token expiry countdown
    #[serde(with = "humantime_serde")]
    pub countdown_tick: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            issuer: IssuerConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "http://localhost:8085".to_string(),
            api_key: None,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer: 64,
            countdown_tick: Duration::from_secs(1),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: COLLABNOTE_<SECTION>_<KEY>
    /// Example: COLLABNOTE_ENGINE_RPC_ADDR=http://localhost:8085
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Engine config
        if let Ok(addr) = env::var("COLLABNOTE_ENGINE_RPC_ADDR") {
            config.engine.rpc_addr = addr;
        }
        if let Ok(key) = env::var("COLLABNOTE_ENGINE_API_KEY") {
            if !key.is_empty() {
                config.engine.api_key = Some(key);
            }
        }

        // Issuer config
        if let Ok(base) = env::var("COLLABNOTE_ISSUER_BASE_URL") {
            config.issuer.base_url = base;
        }

        // Session config
        if let Ok(buffer) = env::var("COLLABNOTE_SESSION_EVENT_BUFFER") {
            config.session.event_buffer = buffer
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid event buffer: {}", e)))?;
        }

        // Logging config
        if let Ok(level) = env::var("COLLABNOTE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("COLLABNOTE_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate engine config
        if self.engine.rpc_addr.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "engine rpc_addr must not be empty".to_string(),
            ));
        }

        // Validate issuer config
        let base = self.issuer.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::ValidationFailed(format!(
                "issuer base_url must use http:// or https://: {}",
                self.issuer.base_url
            )));
        }

        // Validate session config
        if self.session.event_buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_buffer must be greater than 0".to_string(),
            ));
        }
        if self.session.countdown_tick.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "countdown_tick must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.engine.rpc_addr = "".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.issuer.base_url = "localhost:3000".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.session.event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collabnote.toml");

        let mut config = Config::default();
        config.engine.rpc_addr = "https://collab.example.com".to_string();
        config.engine.api_key = Some("key-123".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.engine.rpc_addr, "https://collab.example.com");
        assert_eq!(loaded.engine.api_key.as_deref(), Some("key-123"));
    }
}
