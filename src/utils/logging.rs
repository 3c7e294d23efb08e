//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging
//! utilities for hosts embedding the waterfall engine.

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::utils::errors::Result;

/// Initialize logging based on configuration.
///
/// The returned guard owns the background file writer; keep it alive for
/// the lifetime of the host or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "waterfall.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log a completed turn with structured data
pub fn log_turn(conversation_id: &str, step: usize, disposition: &str) {
    info!(
        conversation_id = conversation_id,
        step = step,
        disposition = disposition,
        "Turn processed"
    );
}
