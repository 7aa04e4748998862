//! Logging bootstrap for Leasehold binaries.
//!
//! Library crates only emit `tracing` events; a binary calls [`init_logging`]
//! once to install a console layer and, when a log directory is configured, a
//! daily-rotated `leasehold.log` file.
//!
//! The global `RUST_LOG` env var wins over the configured level when set.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::{LeaseholdError, Result};

const LOG_FILE_NAME: &str = "leasehold.log";

pub const ENV_LOG_DIR: &str = "LEASEHOLD_LOG_DIR";
pub const ENV_LOG_CONSOLE: &str = "LEASEHOLD_LOG_CONSOLE";
pub const ENV_LOG_LEVEL: &str = "LEASEHOLD_LOG_LEVEL";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for the rolling log file; `None` disables file output
    pub log_dir: Option<PathBuf>,
    /// Enable console output
    pub console_output: bool,
    /// Minimum level when `RUST_LOG` is not set
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_output: true,
            level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `LEASEHOLD_LOG_DIR`, `LEASEHOLD_LOG_CONSOLE` and `LEASEHOLD_LOG_LEVEL`
    /// as found by `lookup`; variables that are unset keep the current value.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(console) = lookup(ENV_LOG_CONSOLE) {
            self.console_output = console.to_lowercase() != "false" && console != "0";
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        self
    }

    /// Create from application configuration.
    pub fn from_config(log_dir: Option<PathBuf>, level: String) -> Self {
        Self {
            log_dir,
            console_output: true,
            level: level.parse().unwrap_or(Level::INFO),
        }
    }

    /// Override the level, e.g. from a `--verbose` flag
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Guard that keeps the file writer alive.
///
/// Dropping it flushes buffered log output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Initialize the global subscriber.
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be created.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter_for(config.level));
        layers.push(Box::new(console_layer));
    }

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir).map_err(|e| {
            LeaseholdError::Logging(format!(
                "failed to create log directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter_for(config.level));
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LeaseholdError::Logging(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_from_config_parses_level() {
        let config = LoggingConfig::from_config(None, "debug".to_string());
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.console_output);

        let config = LoggingConfig::from_config(None, "nonsense".to_string());
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_env_overrides_only_set_variables() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_LOG_LEVEL, "warn"),
            (ENV_LOG_CONSOLE, "false"),
        ]);
        let config = LoggingConfig::from_config(Some(PathBuf::from("logs")), "debug".to_string())
            .with_env_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.level, Level::WARN);
        assert!(!config.console_output);
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));

        // An unparseable level keeps the configured one
        let config = LoggingConfig::default()
            .with_env_overrides(|name| (name == ENV_LOG_LEVEL).then(|| "loud".to_string()));
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_with_level() {
        let config = LoggingConfig::default().with_level(Level::TRACE);
        assert_eq!(config.level, Level::TRACE);
        assert!(config.log_dir.is_none());
    }
}
