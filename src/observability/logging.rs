//! Logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Default filter when neither `RUST_LOG` nor settings give one.
pub const DEFAULT_FILTER: &str = "warn";

/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "warcdedup=debug,info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to `Pretty`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Line format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds the config from file/env settings. `verbose` overrides the level.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();
        if let Some(settings) = settings {
            if let Some(ref format) = settings.format {
                config.format = LogFormat::parse(format);
            }
            if let Some(ref level) = settings.level {
                config.filter.clone_from(level);
            }
            config.file.clone_from(&settings.file);
        }
        if verbose {
            config.filter = VERBOSE_FILTER.to_string();
        }
        config
    }
}
