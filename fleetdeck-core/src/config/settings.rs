//! Application settings (`config.toml`)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::monitoring::{CollectorConfig, MIN_COLLECT_INTERVAL_SECS};
use crate::pool::PoolConfig;
use crate::secret::DEFAULT_VAULT_KEY_ENV;
use crate::terminal::TerminalConfig;
use crate::tracing::{TracingConfig, TracingLevel, TracingOutput};
use crate::transport::PtyRequest;
use crate::uptime::{CheckerConfig, UptimeWindow};

/// Root of `config.toml`; every field is optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Connection pool
    pub pool: PoolSettings,
    /// Metrics collector
    pub metrics: MetricsSettings,
    /// Monitor checker
    pub monitor: MonitorSettings,
    /// Terminal bridge
    pub terminal: TerminalSettings,
    /// Logging
    pub logging: LoggingSettings,
    /// Environment variable holding the hex vault key
    pub vault_key_env: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            metrics: MetricsSettings::default(),
            monitor: MonitorSettings::default(),
            terminal: TerminalSettings::default(),
            logging: LoggingSettings::default(),
            vault_key_env: DEFAULT_VAULT_KEY_ENV.to_string(),
        }
    }
}

impl Settings {
    /// Parses settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml(text: &str, origin: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects zero caps and intervals
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("pool.max_conns_per_server", self.pool.max_conns_per_server as u64),
            ("pool.idle_timeout_secs", self.pool.idle_timeout_secs),
            ("pool.keepalive_interval_secs", self.pool.keepalive_interval_secs),
            ("pool.sweep_interval_secs", self.pool.sweep_interval_secs),
            ("pool.dial_timeout_secs", self.pool.dial_timeout_secs),
            ("pool.probe_timeout_secs", self.pool.probe_timeout_secs),
            ("metrics.probe_timeout_secs", self.metrics.probe_timeout_secs),
            ("monitor.scan_interval_secs", self.monitor.scan_interval_secs),
            ("terminal.initial_cols", u64::from(self.terminal.initial_cols)),
            ("terminal.initial_rows", u64::from(self.terminal.initial_rows)),
            ("terminal.read_buffer_size", self.terminal.read_buffer_size as u64),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }

        if self.metrics.interval_secs < MIN_COLLECT_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "metrics.interval_secs must be at least {MIN_COLLECT_INTERVAL_SECS}"
            )));
        }
        if self.terminal.term.trim().is_empty() {
            return Err(ConfigError::Invalid("terminal.term must not be empty".to_string()));
        }
        if self.vault_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid("vault_key_env must not be empty".to_string()));
        }
        if let Some(level) = &self.logging.level {
            level
                .parse::<TracingLevel>()
                .map_err(|e| ConfigError::Invalid(format!("logging.level: {e}")))?;
        }
        Ok(())
    }
}

/// `[pool]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Advisory cap per `host:port`
    pub max_conns_per_server: usize,
    /// Idle time before the sweep closes a connection
    pub idle_timeout_secs: u64,
    /// Keepalive period
    pub keepalive_interval_secs: u64,
    /// Idle sweep period
    pub sweep_interval_secs: u64,
    /// Dial timeout
    pub dial_timeout_secs: u64,
    /// Health probe timeout
    pub probe_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_conns_per_server: 5,
            idle_timeout_secs: 600,
            keepalive_interval_secs: 30,
            sweep_interval_secs: 60,
            dial_timeout_secs: 10,
            probe_timeout_secs: 5,
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(s: &PoolSettings) -> Self {
        Self {
            max_conns_per_server: s.max_conns_per_server,
            idle_timeout: Duration::from_secs(s.idle_timeout_secs),
            keepalive_interval: Duration::from_secs(s.keepalive_interval_secs),
            sweep_interval: Duration::from_secs(s.sweep_interval_secs),
            dial_timeout: Duration::from_secs(s.dial_timeout_secs),
            probe_timeout: Duration::from_secs(s.probe_timeout_secs),
        }
    }
}

/// `[metrics]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether `run` starts the collector
    pub enabled: bool,
    /// Collection period
    pub interval_secs: u64,
    /// Timeout for one probe session
    pub probe_timeout_secs: u64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            probe_timeout_secs: 10,
        }
    }
}

impl From<&MetricsSettings> for CollectorConfig {
    fn from(s: &MetricsSettings) -> Self {
        Self {
            interval: Duration::from_secs(s.interval_secs),
            probe_timeout: Duration::from_secs(s.probe_timeout_secs),
        }
    }
}

/// `[monitor]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Whether `run` starts the checker
    pub enabled: bool,
    /// Scan period
    pub scan_interval_secs: u64,
    /// `"all"` or a trailing probe count
    pub uptime_window: UptimeWindow,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            uptime_window: UptimeWindow::default(),
        }
    }
}

impl From<&MonitorSettings> for CheckerConfig {
    fn from(s: &MonitorSettings) -> Self {
        Self {
            scan_interval: Duration::from_secs(s.scan_interval_secs),
            window: s.uptime_window,
        }
    }
}

/// `[terminal]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Initial columns
    pub initial_cols: u16,
    /// Initial rows
    pub initial_rows: u16,
    /// `TERM` for the remote shell
    pub term: String,
    /// Read buffer per output stream
    pub read_buffer_size: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            initial_cols: 80,
            initial_rows: 24,
            term: "xterm-256color".to_string(),
            read_buffer_size: 4096,
        }
    }
}

impl From<&TerminalSettings> for TerminalConfig {
    fn from(s: &TerminalSettings) -> Self {
        Self {
            pty: PtyRequest {
                term: s.term.clone(),
                cols: s.initial_cols,
                rows: s.initial_rows,
                echo: true,
            },
            read_buffer_size: s.read_buffer_size,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level name; command-line verbosity wins when given
    pub level: Option<String>,
    /// Full `EnvFilter` directive
    pub filter: Option<String>,
    /// Log file instead of stderr; `~` is expanded
    pub file: Option<PathBuf>,
}

impl LoggingSettings {
    /// Builds a tracing config; `verbosity` overrides the configured level
    #[must_use]
    pub fn tracing_config(&self, verbosity: Option<TracingLevel>) -> TracingConfig {
        let level = verbosity
            .or_else(|| self.level.as_deref().and_then(|l| l.parse().ok()))
            .unwrap_or_default();

        let mut config = TracingConfig::new().with_level(level);
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        if let Some(file) = &self.file {
            config = config.with_output(TracingOutput::File(super::expand_path(file)));
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = Settings::from_toml("", "config.toml").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.vault_key_env, "FLEETDECK_VAULT_KEY");
        assert_eq!(PoolConfig::from(&settings.pool), PoolConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            vault_key_env = "MY_KEY"

            [pool]
            max_conns_per_server = 2

            [monitor]
            uptime_window = "all"

            [terminal]
            initial_cols = 120
        "#;
        let settings = Settings::from_toml(text, "config.toml").unwrap();
        assert_eq!(settings.vault_key_env, "MY_KEY");
        assert_eq!(settings.pool.max_conns_per_server, 2);
        assert_eq!(settings.pool.idle_timeout_secs, 600);
        assert_eq!(settings.monitor.uptime_window, UptimeWindow::AllTime);

        let terminal = TerminalConfig::from(&settings.terminal);
        assert_eq!(terminal.pty.cols, 120);
        assert_eq!(terminal.pty.rows, 24);
    }

    #[test]
    fn test_validation() {
        let zero_cap = "[pool]\nmax_conns_per_server = 0";
        assert!(matches!(
            Settings::from_toml(zero_cap, "c"),
            Err(ConfigError::Invalid(msg)) if msg.contains("max_conns_per_server")
        ));

        let fast_metrics = "[metrics]\ninterval_secs = 1";
        assert!(matches!(
            Settings::from_toml(fast_metrics, "c"),
            Err(ConfigError::Invalid(_))
        ));

        let bad_level = "[logging]\nlevel = \"chatty\"";
        assert!(Settings::from_toml(bad_level, "c").is_err());

        assert!(matches!(
            Settings::from_toml("[pool", "c"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_verbosity_overrides_configured_level() {
        let logging = LoggingSettings {
            level: Some("warn".to_string()),
            ..LoggingSettings::default()
        };
        assert_eq!(logging.tracing_config(None).level, TracingLevel::Warn);
        assert_eq!(
            logging.tracing_config(Some(TracingLevel::Trace)).level,
            TracingLevel::Trace
        );
    }
}
