//! # Observability
//!
//! Centralized logging layer for the market portal workspace.
//!
//! Binaries call `observability::init()` (or `init_with_config`) once at
//! startup and use standard `tracing` macros everywhere else. Library crates
//! never install a subscriber themselves.
//!
//! ## Dev Mode
//!
//! With the default `dev` feature every process appends structured JSONL to
//! `~/.market-portal/logs/portal.jsonl`:
//!
//! - `tail -f ~/.market-portal/logs/portal.jsonl | jq` for pretty JSON
//! - `lnav ~/.market-portal/logs/portal.jsonl` for interactive exploration
//!
//! Fields whose names look like credentials (`access_token`, `password`,
//! `authorization`, ...) are redacted before a line is written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "portal-cli".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;
mod redact;

use std::path::PathBuf;

pub use json_layer::LogEntry;
pub use redact::{is_sensitive_key, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "portal-cli").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.market-portal/logs/portal.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        if let Err(e) = dev::init_dev_subscriber(&config) {
            eprintln!("observability: falling back to stderr logging: {e}");
            init_stderr_subscriber(&config);
        }
    }

    #[cfg(not(feature = "dev"))]
    {
        init_stderr_subscriber(&config);
    }
}

fn init_stderr_subscriber(config: &LogConfig) {
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .try_init();
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
