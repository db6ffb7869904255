//! Configuration module for the watch engine.
//!
//! Provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - Caller overrides through the builder
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PW_` and use double
//! underscores to separate nested levels:
//! - `PW_WATCH__USE_POLLING=true` sets `watch.use_polling`
//! - `PW_WATCH__INTERVAL=250` sets `watch.interval`
//! - `PW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the configuration file searched in the working directory and its
/// ancestors.
const CONFIG_FILE: &str = "pathwatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Watch engine behavior
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Behavior of one watcher instance.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Share one platform handle between subscriptions on the same path
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Use stat polling instead of platform events
    #[serde(default = "default_false")]
    pub use_polling: bool,

    /// Polling interval in milliseconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Polling interval for binary files in milliseconds
    #[serde(default = "default_binary_interval")]
    pub binary_interval: u64,

    /// Apply `binary_interval` to paths the classifier marks binary
    #[serde(default = "default_true")]
    pub enable_binary_interval: bool,

    /// Descend through symbolic links instead of watching them as leaves
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Suppress add/addDir events for entries present at startup
    #[serde(default = "default_false")]
    pub ignore_initial: bool,

    /// Maximum recursion depth; unlimited when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    /// Glob patterns for paths to ignore entirely
    #[serde(default)]
    pub ignored: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_interval() -> u64 {
    100
}
fn default_binary_interval() -> u64 {
    300
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            use_polling: false,
            interval: default_interval(),
            binary_interval: default_binary_interval(),
            enable_binary_interval: true,
            follow_symlinks: true,
            ignore_initial: false,
            depth: None,
            ignored: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn binary_interval(&self) -> Duration {
        Duration::from_millis(self.binary_interval)
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_config().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Layer in environment variables with PW_ prefix; double
            // underscore separates nested levels
            .merge(
                Env::prefixed("PW_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find the configuration file, searching from the current directory up
    /// to the filesystem root.
    fn find_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let candidate = ancestor.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}
