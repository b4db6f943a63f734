//! Tracing subscriber setup
//!
//! The library only emits `tracing` events. Applications that want them
//! formatted call [`init_tracing`] once at startup:
//!
//! ```rust,ignore
//! use unillm::observability::{init_tracing, TracingConfig, OutputFormat};
//!
//! let _guard = init_tracing(TracingConfig::default().with_format(OutputFormat::Json))?;
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::LlmError;

/// Environment variable consulted by [`TracingConfig::from_env`] for the filter.
pub const LOG_LEVEL_ENV: &str = "UNILLM_LOG_LEVEL";
/// Environment variable consulted by [`TracingConfig::from_env`] for the format.
pub const LOG_FORMAT_ENV: &str = "UNILLM_LOG_FORMAT";
/// Environment variable consulted by [`TracingConfig::from_env`] for the log file.
pub const LOG_FILE_ENV: &str = "UNILLM_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// `EnvFilter` directive; `None` reads `RUST_LOG`, falling back to `unillm=info`
    pub filter: Option<String>,
    pub output_format: OutputFormat,
    /// Write to this file through a non-blocking writer instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }
}

impl TracingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Read `UNILLM_LOG_LEVEL`, `UNILLM_LOG_FORMAT` and `UNILLM_LOG_FILE`.
    pub fn from_env() -> Result<Self, LlmError> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.filter = Some(format!("unillm={}", level.to_lowercase()));
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.output_format = match format.to_lowercase().as_str() {
                "text" => OutputFormat::Text,
                "json" => OutputFormat::Json,
                other => {
                    return Err(LlmError::configuration(format!(
                        "invalid log format '{other}', expected text or json"
                    )));
                }
            };
        }
        if let Ok(path) = std::env::var(LOG_FILE_ENV) {
            config.log_file = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    fn env_filter(&self) -> Result<EnvFilter, LlmError> {
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive).map_err(|e| {
                LlmError::configuration(format!("invalid log filter '{directive}': {e}"))
            }),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("unillm=info"))),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Returns the non-blocking writer's guard when logging to a file; keep it
/// alive for as long as events should be flushed. Installing a second global
/// subscriber is a `configuration` error.
pub fn init_tracing(config: TracingConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let filter = config.env_filter()?;
    let (writer, guard) = match &config.log_file {
        Some(path) => {
            let file_name = path.file_name().ok_or_else(|| {
                LlmError::configuration(format!("log file '{}' has no file name", path.display()))
            })?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);
    let installed = match config.output_format {
        OutputFormat::Text => builder.with_ansi(config.log_file.is_none()).try_init(),
        OutputFormat::Json => builder.json().with_thread_ids(true).try_init(),
    };
    installed.map_err(|e| {
        LlmError::configuration(format!("failed to install tracing subscriber: {e}"))
            .with_operation("init_tracing")
    })?;
    Ok(guard)
}
