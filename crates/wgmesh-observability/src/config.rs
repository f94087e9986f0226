//! Logging configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Console output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
    /// Single-line text
    Compact,
}

/// Minimum level when no filter directives are given
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count onto a level: none is info, one is debug, more is trace
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    /// Additional JSON output to rolling files
    #[serde(default)]
    pub file: Option<FileLoggingConfig>,

    /// Include file and line number
    #[serde(default)]
    pub include_location: bool,

    /// Include the module path
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// `EnvFilter` directives; override `level`. `RUST_LOG` overrides both.
    #[serde(default)]
    pub filter_directives: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            file: None,
            include_location: false,
            include_target: true,
            filter_directives: None,
        }
    }
}

impl LoggingConfig {
    /// The filter used when `RUST_LOG` is not set.
    ///
    /// Dependency crates are held at `warn` unless explicit directives are
    /// configured, so `-vv` traces wgmesh without tracing every HTTP frame.
    pub fn default_directives(&self) -> String {
        match &self.filter_directives {
            Some(directives) => directives.clone(),
            None => format!(
                "warn,wgmesh={level},wgmesh_overlay={level},wgmesh_directory={level},wgmesh_reconciler={level}",
                level = self.level.as_str()
            ),
        }
    }
}

/// Rolling file output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub rotation: RotationStrategy,
}

fn default_prefix() -> String {
    "wgmesh".to_string()
}

/// When to start a new log file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    Never,
}
