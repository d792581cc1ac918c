//! Logging subsystem
//!
//! Structured logging via tracing with JSON output in production and
//! plaintext in development.
//!
//! # Environment Variables
//!
//! - `CHIRP_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard to track if logging has been initialized
static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Machine-readable JSON lines (production)
    #[default]
    Json,
    /// Human-readable plaintext (development)
    Plaintext,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub default_level: Level,
}

impl LogConfig {
    /// Plaintext at DEBUG, for local development.
    pub fn development() -> Self {
        LogConfig {
            format: LogFormat::Plaintext,
            default_level: Level::DEBUG,
        }
    }

    /// JSON at INFO, for production.
    pub fn production() -> Self {
        LogConfig {
            format: LogFormat::Json,
            default_level: Level::INFO,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Idempotent: the second and later calls are no-ops, so tests can
/// call it freely.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    if INIT_GUARD.set(()).is_err() {
        return Ok(());
    }

    let filter = env_filter(config.default_level);

    match config.format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
    }

    Ok(())
}

/// Build the env filter: CHIRP_LOG wins over RUST_LOG, falling back to
/// the configured default level.
fn env_filter(default_level: Level) -> EnvFilter {
    if let Ok(filter) = std::env::var("CHIRP_LOG") {
        if !filter.is_empty() {
            if let Ok(parsed) = EnvFilter::try_new(&filter) {
                return parsed;
            }
        }
    }
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}
