//! Structured logging to the console and optional rolling files

use std::io;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{FileLoggingConfig, LogFormat, LoggingConfig, RotationStrategy};
use crate::error::{ObservabilityError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive; hold it until the process exits
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

impl LogGuard {
    fn new(guard: Option<WorkerGuard>) -> Self {
        Self { _guard: guard }
    }

    /// Whether a file writer is attached
    pub fn has_file_writer(&self) -> bool {
        self._guard.is_some()
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.default_directives()))
        .map_err(|e| ObservabilityError::Config(format!("invalid log filter: {e}")))?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];

    let guard = match &config.file {
        Some(file_config) => {
            let (writer, guard) = create_file_writer(file_config)?;
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(config.include_target)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .json()
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| ObservabilityError::LoggingInit(e.to_string()))?;

    Ok(LogGuard::new(guard))
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn create_file_writer(config: &FileLoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };

    std::fs::create_dir_all(&config.directory)?;
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log")
        .build(&config.directory)
        .map_err(|e| ObservabilityError::Config(format!("log file appender: {e}")))?;

    Ok(tracing_appender::non_blocking(appender))
}
