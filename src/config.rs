//! Environment-based Configuration for the Casino Backend
//!
//! This module provides configuration loading from environment variables.
//! All sensitive values (shared secrets) MUST come from environment
//! variables, never from hardcoded values.
//!
//! # Environment Variables
//!
//! ## Shared Secrets
//! - `CASINO_SECRET` - signs Casino -> Provider requests (`x-casino-signature`)
//! - `PROVIDER_SECRET` - verifies Provider -> Casino callbacks (`x-provider-signature`)
//!
//! A missing secret is not fatal at boot: the signature gate answers
//! HTTP 500 on every gated request until it is configured.
//!
//! ## Optional Settings
//! - `CASINO_DB_PATH` - SQLite database path (default: `data/casino.db`)
//! - `CASINO_API_PORT` - REST API port (default: 3000)
//! - `CASINO_PROVIDER_TIMEOUT_SECS` - outbound call timeout (default: 10)
//! - `CASINO_LOG_LEVEL` - logging level (debug, info, warn, error)
//! - `CASINO_LOG_JSON` - set to "1" for JSON log output

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct CasinoConfig {
    /// Secret signing Casino -> Provider requests. None until configured.
    pub casino_secret: Option<String>,

    /// Secret verifying Provider -> Casino callbacks. None until configured.
    pub provider_secret: Option<String>,

    /// SQLite database path
    pub db_path: String,

    /// REST API port
    pub api_port: u16,

    /// Timeout for outbound provider calls, in seconds
    pub provider_timeout_secs: u64,

    /// Log level
    pub log_level: String,

    /// Emit JSON-formatted logs
    pub log_json: bool,
}

impl CasinoConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let casino_secret = env::var("CASINO_SECRET").ok().filter(|s| !s.is_empty());
        let provider_secret = env::var("PROVIDER_SECRET").ok().filter(|s| !s.is_empty());

        let db_path = env::var("CASINO_DB_PATH").unwrap_or_else(|_| "data/casino.db".to_string());

        let api_port = match env::var("CASINO_API_PORT") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::InvalidValue("CASINO_API_PORT".to_string(), value.clone())
            })?,
            Err(_) => 3000,
        };

        let provider_timeout_secs = match env::var("CASINO_PROVIDER_TIMEOUT_SECS") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::InvalidValue("CASINO_PROVIDER_TIMEOUT_SECS".to_string(), value.clone())
            })?,
            Err(_) => 10,
        };

        let log_level = env::var("CASINO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("CASINO_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            casino_secret,
            provider_secret,
            db_path,
            api_port,
            provider_timeout_secs,
            log_level,
            log_json,
        })
    }

    /// Require both shared secrets to be present (for production startup checks)
    pub fn require_secrets(&self) -> Result<(), ConfigError> {
        if self.casino_secret.is_none() {
            return Err(ConfigError::MissingEnvVar("CASINO_SECRET".to_string()));
        }
        if self.provider_secret.is_none() {
            return Err(ConfigError::MissingEnvVar("PROVIDER_SECRET".to_string()));
        }
        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Casino Configuration ===");
        println!("Database: {}", self.db_path);
        println!("API Port: {}", self.api_port);
        println!("Provider Timeout: {}s", self.provider_timeout_secs);
        println!(
            "Casino Secret: {}",
            if self.casino_secret.is_some() { "set" } else { "MISSING" }
        );
        println!(
            "Provider Secret: {}",
            if self.provider_secret.is_some() { "set" } else { "MISSING" }
        );
        println!("Log Level: {}", self.log_level);
        println!("============================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_secrets() {
        let config = CasinoConfig {
            casino_secret: Some("a".to_string()),
            provider_secret: None,
            db_path: "test.db".to_string(),
            api_port: 3000,
            provider_timeout_secs: 10,
            log_level: "info".to_string(),
            log_json: false,
        };

        assert!(config.require_secrets().is_err());

        let config = CasinoConfig {
            provider_secret: Some("b".to_string()),
            ..config
        };
        assert!(config.require_secrets().is_ok());
    }
}
