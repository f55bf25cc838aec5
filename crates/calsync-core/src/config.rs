//! Configuration module for calsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for calsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// How the lower bound of the fetch window is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// `[now - window_past_days, now + window_future_days]` on every sync.
    #[default]
    Rolling,
    /// Lower bound is the last sync cursor. Deprecated; a stale cursor makes
    /// every fetch reach further into the past.
    Cursor,
}

/// Synchronization timing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic sync triggers.
    pub poll_interval: u64,
    /// Retries after the first failed attempt before reporting an error.
    pub max_retries: u32,
    /// Base retry delay in seconds; the n-th retry waits `n * retry_interval`.
    pub retry_interval: u64,
    /// Days before now covered by each fetch.
    pub window_past_days: u32,
    /// Days after now covered by each fetch.
    pub window_future_days: u32,
    pub window_policy: WindowPolicy,
    /// Reminder lead time attached to created and updated events, in minutes.
    pub reminder_minutes: u32,
}

/// Calendar store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Path of the file-backed calendar store.
    pub calendar_file: PathBuf,
    /// Whether to trigger a sync when the calendar store changes on disk.
    pub watch_changes: bool,
    /// Create an empty store with one writable calendar if none exists.
    pub create_if_missing: bool,
}

/// Sync state persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the snapshot and cursor.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/calsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("calsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("calsync")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: 120,
            max_retries: 3,
            retry_interval: 5,
            window_past_days: 7,
            window_future_days: 7,
            window_policy: WindowPolicy::Rolling,
            reminder_minutes: 30,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            calendar_file: data_dir().join("calendar.json"),
            watch_changes: true,
            create_if_missing: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("calsync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `sync.max_retries`.
const MAX_RETRIES_LIMIT: u32 = 10;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.poll_interval == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.retry_interval == 0 {
            errors.push(ValidationError {
                field: "sync.retry_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.max_retries > MAX_RETRIES_LIMIT {
            errors.push(ValidationError {
                field: "sync.max_retries".into(),
                message: format!("must be at most {MAX_RETRIES_LIMIT}"),
            });
        }
        if self.sync.window_past_days == 0 && self.sync.window_future_days == 0 {
            errors.push(ValidationError {
                field: "sync.window_future_days".into(),
                message: "fetch window must cover at least one day".into(),
            });
        }

        // --- provider ---
        if self.provider.calendar_file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "provider.calendar_file".into(),
                message: "must not be empty".into(),
            });
        }

        // --- storage ---
        if self.storage.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use calsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_poll_interval(60)
///     .sync_max_retries(2)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.sync.max_retries, 2);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn sync_max_retries(mut self, n: u32) -> Self {
        self.config.sync.max_retries = n;
        self
    }

    pub fn sync_retry_interval(mut self, seconds: u64) -> Self {
        self.config.sync.retry_interval = seconds;
        self
    }

    pub fn sync_window_days(mut self, past: u32, future: u32) -> Self {
        self.config.sync.window_past_days = past;
        self.config.sync.window_future_days = future;
        self
    }

    pub fn sync_window_policy(mut self, policy: WindowPolicy) -> Self {
        self.config.sync.window_policy = policy;
        self
    }

    pub fn sync_reminder_minutes(mut self, minutes: u32) -> Self {
        self.config.sync.reminder_minutes = minutes;
        self
    }

    // --- provider ---

    pub fn provider_calendar_file(mut self, path: PathBuf) -> Self {
        self.config.provider.calendar_file = path;
        self
    }

    pub fn provider_watch_changes(mut self, watch: bool) -> Self {
        self.config.provider.watch_changes = watch;
        self
    }

    pub fn provider_create_if_missing(mut self, create: bool) -> Self {
        self.config.provider.create_if_missing = create;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
