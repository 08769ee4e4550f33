//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `WARCDEDUP_CONFIG_PATH`, or the platform
//!    config directory)
//! 3. `WARCDEDUP_*` environment variables
//!
//! ```toml
//! [index]
//! enabled = true
//! endpoint = "http://wwwb-dedup.us.archive.org:8083/cdx/search"
//!
//! [index.retry]
//! max_attempts = 10
//! base_delay_ms = 1000
//! timeout_secs = 60
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```

use crate::index::{DEFAULT_ENDPOINT, IndexSettings, RetryPolicy};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "WARCDEDUP_CONFIG_PATH";

/// Main configuration for warcdedup.
#[derive(Debug, Clone, Default)]
pub struct DedupConfig {
    /// External index lookups.
    pub index: IndexConfig,
    /// Process logging.
    pub logging: LoggingSettings,
}

/// Resolved index settings.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// When `false`, only duplicates within the input file are found.
    pub enabled: bool,
    /// CDX search endpoint.
    pub endpoint: String,
    /// Retry and timeout policy.
    pub retry: RetryPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Logging section in config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `warcdedup=debug`.
    pub level: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Index section.
    pub index: Option<IndexSettings>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

impl DedupConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid for [`ConfigFile`].
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `WARCDEDUP_CONFIG_PATH` first, then the platform config dir
    /// (`~/.config/warcdedup/config.toml` on Linux). A missing file yields
    /// defaults; a file that exists but fails to parse is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is found but cannot be loaded.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Self::load_from_file(Path::new(&path));
        }

        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Ok(Self::default());
        };
        let platform_config = base_dirs
            .config_dir()
            .join("warcdedup")
            .join("config.toml");
        if platform_config.exists() {
            return Self::load_from_file(&platform_config);
        }

        Ok(Self::default())
    }

    /// Converts a `ConfigFile` to `DedupConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(index) = file.index {
            if let Some(enabled) = index.enabled {
                config.index.enabled = enabled;
            }
            if let Some(endpoint) = index.endpoint {
                config.index.endpoint = endpoint;
            }
            config.index.retry = RetryPolicy::from_settings(index.retry.as_ref());
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Applies `WARCDEDUP_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an unparseable value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies `WARCDEDUP_*` overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an unparseable value.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = var("WARCDEDUP_INDEX_ENABLED") {
            self.index.enabled = parse_bool("WARCDEDUP_INDEX_ENABLED", &value)?;
        }
        if let Some(value) = var("WARCDEDUP_INDEX_ENDPOINT") {
            self.index.endpoint = value;
        }
        if let Some(value) = var("WARCDEDUP_INDEX_MAX_ATTEMPTS") {
            let attempts: u32 = parse_number("WARCDEDUP_INDEX_MAX_ATTEMPTS", &value)?;
            self.index.retry.max_attempts = attempts.max(1);
        }
        if let Some(value) = var("WARCDEDUP_INDEX_BASE_DELAY_MS") {
            self.index.retry.base_delay =
                Duration::from_millis(parse_number("WARCDEDUP_INDEX_BASE_DELAY_MS", &value)?);
        }
        if let Some(value) = var("WARCDEDUP_INDEX_TIMEOUT_SECS") {
            self.index.retry.timeout =
                Duration::from_secs(parse_number("WARCDEDUP_INDEX_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = var("WARCDEDUP_LOG_FORMAT") {
            self.logging.format = Some(value);
        }
        if let Some(value) = var("WARCDEDUP_LOG_LEVEL") {
            self.logging.level = Some(value);
        }
        if let Some(value) = var("WARCDEDUP_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(value));
        }

        Ok(self)
    }

    /// Disables external index lookups.
    #[must_use]
    pub fn without_index(mut self) -> Self {
        self.index.enabled = false;
        self
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{name} must be a number, got {value:?}")))
}
