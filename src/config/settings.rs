//! Engine settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};

/// Main configuration structure for an embedding host
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub engine: EngineConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

/// Dialog engine behaviour configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Consecutive invalid replies tolerated before the conversation is
    /// cancelled. `None` retries without bound.
    pub max_retries: Option<u32>,
    /// Inbound text that cancels an in-flight conversation (matched
    /// case-insensitively while a prompt is outstanding).
    pub cancel_token: Option<String>,
    /// How long a suspended conversation stays resumable.
    pub state_ttl_seconds: u64,
}

/// Redis configuration for the Redis-backed state store
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
    pub ttl_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("WATERFALL"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> crate::utils::errors::Result<()> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "waterfall:".to_string(),
                ttl_seconds: 3600,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "/var/log/waterfall".to_string(),
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            cancel_token: None,
            state_ttl_seconds: 3600,
        }
    }
}
