//! Configuration management for Leasehold
//!
//! Settings are read from an optional `conf/leasehold.yml` (or an explicit file)
//! layered under `LEASEHOLD_*` environment variables, e.g.
//! `LEASEHOLD_LOCK__NAMESPACE=jobs` or `LEASEHOLD_LOCK__TIMEOUTS__REPORTJOB=120`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{LeaseholdError, Result};
use crate::logging::LoggingConfig;
use crate::{DEFAULT_MARKER, DEFAULT_NAMESPACE};

/// Default configuration file, resolved relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "conf/leasehold";

const LOCK_SECTION: &str = "lock";

/// Lock-layer settings shared by every job type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Prefix of every derived lock key
    pub namespace: String,
    /// Value stored for locks without a lease
    pub marker: String,
    /// Per-job lease overrides in seconds, keyed by job name
    pub timeouts: HashMap<String, u64>,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            marker: DEFAULT_MARKER.to_string(),
            timeouts: HashMap::new(),
        }
    }
}

impl LockSettings {
    /// Reject settings the lock protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(LeaseholdError::Misconfigured(
                "lock namespace must not be empty".to_string(),
            ));
        }
        if self.marker.is_empty() {
            return Err(LeaseholdError::Misconfigured(
                "lock marker must not be empty".to_string(),
            ));
        }
        // A numeric marker would read back as a lease expiry
        if self.marker.trim().parse::<i64>().is_ok() {
            return Err(LeaseholdError::Misconfigured(format!(
                "lock marker '{}' must not be numeric",
                self.marker
            )));
        }
        let mut names: Vec<&String> = self.timeouts.keys().collect();
        names.sort_by_key(|name| name.to_lowercase());
        if let Some(pair) = names
            .windows(2)
            .find(|pair| pair[0].eq_ignore_ascii_case(pair[1]))
        {
            return Err(LeaseholdError::Misconfigured(format!(
                "timeout overrides '{}' and '{}' differ only in case",
                pair[0], pair[1]
            )));
        }
        if let Some((job, _)) = self.timeouts.iter().find(|(_, secs)| **secs == 0) {
            return Err(LeaseholdError::Misconfigured(format!(
                "timeout override for '{}' must be greater than zero",
                job
            )));
        }
        Ok(())
    }

    /// Lease override for a job, if configured
    ///
    /// Environment sources lowercase their keys, so names compare case-insensitively.
    pub fn timeout_for(&self, job_name: &str) -> Option<u64> {
        self.timeouts
            .get(job_name)
            .or_else(|| {
                self.timeouts
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(job_name))
                    .map(|(_, secs)| secs)
            })
            .copied()
    }
}

/// Application configuration wrapper
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Create a configuration from an already-built `Config`
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Load from an explicit file, or the optional default file, plus environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("LEASEHOLD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(Self { config })
    }

    /// Lock settings, falling back to defaults when the section is absent
    pub fn lock_settings(&self) -> Result<LockSettings> {
        let settings = match self.config.get::<LockSettings>(LOCK_SECTION) {
            Ok(settings) => settings,
            Err(ConfigError::NotFound(_)) => LockSettings::default(),
            Err(e) => return Err(e.into()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Logging level (default: info)
    pub fn log_level(&self) -> String {
        self.config
            .get_string("log.level")
            .unwrap_or_else(|_| "info".to_string())
    }

    /// Directory for log files; file logging is off when unset
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.config.get_string("log.dir").ok().map(PathBuf::from)
    }

    /// Logging setup from the `log` section, overridden by `LEASEHOLD_LOG_*` variables
    pub fn logging_config(&self) -> LoggingConfig {
        self.logging_config_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Configuration::logging_config`] with an explicit variable lookup
    pub fn logging_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
        LoggingConfig::from_config(self.log_dir(), self.log_level()).with_env_overrides(lookup)
    }
}
