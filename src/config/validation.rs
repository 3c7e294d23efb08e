//! Configuration validation module
//!
//! This module provides validation functions for engine configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{Result, WaterfallError};

use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_engine_config(&settings.engine)?;
    validate_redis_config(&settings.redis)?;
    validate_logging_config(&settings.logging)?;
    Ok(())
}

/// Validate engine configuration
fn validate_engine_config(config: &super::EngineConfig) -> Result<()> {
    if config.state_ttl_seconds == 0 {
        return Err(WaterfallError::Config(
            "State TTL must be greater than 0".to_string(),
        ));
    }

    if let Some(0) = config.max_retries {
        return Err(WaterfallError::Config(
            "Max retries must be greater than 0 when set".to_string(),
        ));
    }

    if let Some(ref token) = config.cancel_token {
        if token.trim().is_empty() {
            return Err(WaterfallError::Config(
                "Cancel token cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(WaterfallError::Config("Redis URL is required".to_string()));
    }

    if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
        return Err(WaterfallError::Config(
            "Redis URL must start with redis:// or rediss://".to_string(),
        ));
    }

    if config.ttl_seconds == 0 {
        return Err(WaterfallError::Config(
            "Redis TTL must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(WaterfallError::Config(format!(
            "Invalid log level: {}. Must be one of: {}",
            config.level,
            valid_levels.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut settings = Settings::default();
        settings.engine.state_ttl_seconds = 0;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn blank_cancel_token_is_rejected() {
        let mut settings = Settings::default();
        settings.engine.cancel_token = Some("  ".to_string());
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".to_string();
        assert!(validate_settings(&settings).is_err());
    }
}
