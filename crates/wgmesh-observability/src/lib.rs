//! wgmesh Observability - structured logging
//!
//! ```no_run
//! use wgmesh_observability::{init_logging, LoggingConfig};
//!
//! let _guard = init_logging(&LoggingConfig::default()).expect("logging");
//! tracing::info!("started");
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use config::{FileLoggingConfig, LogFormat, LogLevel, LoggingConfig, RotationStrategy};
pub use error::{ObservabilityError, Result};
pub use logging::{init_logging, LogGuard};
