//! Structured logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a single
//! fmt layer. Span and field names used across the core are exported so
//! that log consumers can filter on them.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

static TRACING_CONFIG: OnceLock<TracingConfig> = OnceLock::new();

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// The subscriber could not be installed or the filter is invalid
    #[error("Failed to initialize tracing: {0}")]
    InitializationFailed(String),

    /// Tracing already initialized
    #[error("Tracing has already been initialized")]
    AlreadyInitialized,

    /// The log file could not be opened
    #[error("Failed to open log file {path}: {message}")]
    FileCreationFailed {
        /// Log file path
        path: String,
        /// OS error text
        message: String,
    },
}

/// Result type for tracing operations
pub type TracingResult<T> = Result<T, TracingError>;

/// Minimum level emitted when no custom filter is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingLevel {
    /// Errors only
    Error,
    /// Errors and warnings
    Warn,
    /// Informational events (default)
    #[default]
    Info,
    /// Debug events
    Debug,
    /// Everything
    Trace,
}

impl TracingLevel {
    /// Converts to the `tracing` level
    #[must_use]
    pub const fn to_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Maps a `-v` count to a level (0 = info)
    #[must_use]
    pub const fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Info,
            1 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl std::str::FromStr for TracingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl std::fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Standard output
    Stdout,
    /// Standard error
    #[default]
    Stderr,
    /// Append to a file (ANSI colors disabled)
    File(PathBuf),
}

/// Configuration for [`init_tracing`]
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Minimum level
    pub level: TracingLevel,
    /// Destination
    pub output: TracingOutput,
    /// `EnvFilter` directives; overrides `level` when set
    pub filter: Option<String>,
    /// Include thread ids in every line
    pub thread_ids: bool,
}

impl TracingConfig {
    /// Creates a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Sets custom filter directives
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enables thread ids
    #[must_use]
    pub const fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Builds the filter: explicit directives, else `RUST_LOG`, else the level
    fn env_filter(&self) -> TracingResult<EnvFilter> {
        if let Some(directives) = &self.filter {
            return EnvFilter::try_new(directives)
                .map_err(|e| TracingError::InitializationFailed(e.to_string()));
        }
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        Ok(EnvFilter::new(format!(
            "fleetdeck_core={level},fleetdeck={level},warn",
            level = self.level
        )))
    }
}

/// Installs the global subscriber
///
/// # Errors
///
/// Returns [`TracingError::AlreadyInitialized`] on a second call, or an
/// error when the filter is invalid or the log file cannot be opened.
pub fn init_tracing(config: &TracingConfig) -> TracingResult<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(TracingError::AlreadyInitialized);
    }

    let filter = config.env_filter()?;

    let (writer, ansi) = match &config.output {
        TracingOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        TracingOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        TracingOutput::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| TracingError::FileCreationFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(ansi)
                .with_thread_ids(config.thread_ids)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    let _ = TRACING_CONFIG.set(config.clone());

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

/// Checks if tracing has been initialized
#[must_use]
pub fn is_tracing_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::SeqCst)
}

/// Gets the active configuration, if any
#[must_use]
pub fn get_tracing_config() -> Option<&'static TracingConfig> {
    TRACING_CONFIG.get()
}

/// Span names used by the core
pub mod span_names {
    /// Connection acquisition through the pool
    pub const POOL_ACQUIRE: &str = "pool.acquire";
    /// Dialing a new connection
    pub const POOL_DIAL: &str = "pool.dial";
    /// One interactive terminal session
    pub const TERMINAL_SESSION: &str = "terminal.session";
    /// Metrics collection for one host
    pub const METRICS_COLLECT: &str = "metrics.collect";
    /// One monitor probe
    pub const MONITOR_CHECK: &str = "monitor.check";
    /// One-shot command execution
    pub const COMMAND_EXEC: &str = "command.exec";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level_from_str() {
        assert_eq!("error".parse::<TracingLevel>(), Ok(TracingLevel::Error));
        assert_eq!("Warning".parse::<TracingLevel>(), Ok(TracingLevel::Warn));
        assert_eq!("TRACE".parse::<TracingLevel>(), Ok(TracingLevel::Trace));
        assert!("loud".parse::<TracingLevel>().is_err());
    }

    #[test]
    fn test_level_roundtrips_through_display() {
        for level in [
            TracingLevel::Error,
            TracingLevel::Warn,
            TracingLevel::Info,
            TracingLevel::Debug,
            TracingLevel::Trace,
        ] {
            assert_eq!(level.to_string().parse::<TracingLevel>(), Ok(level));
        }
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingLevel::from_verbosity(0), TracingLevel::Info);
        assert_eq!(TracingLevel::from_verbosity(1), TracingLevel::Debug);
        assert_eq!(TracingLevel::from_verbosity(5), TracingLevel::Trace);
    }

    #[test]
    fn test_custom_filter_is_validated() {
        let config = TracingConfig::new().with_filter("fleetdeck_core=debug");
        assert!(config.env_filter().is_ok());

        let config = TracingConfig::new().with_filter("fleetdeck_core=loudest");
        assert!(config.env_filter().is_err());
    }

    #[test]
    fn test_span_names_are_dotted_and_unique() {
        let names = [
            span_names::POOL_ACQUIRE,
            span_names::POOL_DIAL,
            span_names::TERMINAL_SESSION,
            span_names::METRICS_COLLECT,
            span_names::MONITOR_CHECK,
            span_names::COMMAND_EXEC,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        for name in names {
            let (area, action) = name.split_once('.').unwrap();
            assert!(!area.is_empty() && !action.is_empty(), "{name}");
        }
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_level(TracingLevel::Debug)
            .with_output(TracingOutput::Stdout)
            .with_thread_ids(true);

        assert_eq!(config.level, TracingLevel::Debug);
        assert_eq!(config.output, TracingOutput::Stdout);
        assert!(config.thread_ids);
        assert!(config.filter.is_none());
    }
}
