//! Error handling for the waterfall engine
//!
//! This module defines the main error types used throughout the crate
//! and provides a unified error handling strategy.

use thiserror::Error;

/// Main error type for waterfall operations
#[derive(Error, Debug)]
pub enum WaterfallError {
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("Unknown step index: {0}")]
    UnknownStep(usize),

    #[error("Persistence error: {0}")]
    Persistence(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for waterfall operations
pub type Result<T> = std::result::Result<T, WaterfallError>;

impl WaterfallError {
    /// Check if the error is recoverable (safe to retry the same turn)
    pub fn is_recoverable(&self) -> bool {
        match self {
            WaterfallError::DuplicateId(_) => false,
            WaterfallError::UnknownPrompt(_) => false,
            WaterfallError::UnknownStep(_) => false,
            WaterfallError::Persistence(_) => true,
            WaterfallError::Serialization(_) => false,
            WaterfallError::Config(_) => false,
            WaterfallError::InvalidInput(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WaterfallError::Config(_) => ErrorSeverity::Critical,
            WaterfallError::DuplicateId(_) => ErrorSeverity::Critical,
            WaterfallError::Persistence(_) => ErrorSeverity::Error,
            WaterfallError::InvalidInput(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
