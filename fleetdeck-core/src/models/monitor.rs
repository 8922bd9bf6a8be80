//! External endpoint monitors and their probe history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of check performed for a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    /// HTTP(S) request compared against an expected status code
    #[default]
    Http,
    /// Plain TCP connect to `host:port`
    Tcp,
}

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Endpoint answered as expected
    Up,
    /// Endpoint failed, timed out, or answered unexpectedly
    Down,
}

impl ProbeStatus {
    /// Returns true for [`ProbeStatus::Up`]
    #[must_use]
    pub const fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_timeout_ms() -> u64 {
    5000
}

const fn default_expected_status() -> u16 {
    200
}

const fn default_enabled() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

/// Mutable rolling state recomputed after every probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    /// When the last probe ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Status of the last probe (`None` until the first probe)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<ProbeStatus>,
    /// Latency of the last probe
    #[serde(default)]
    pub last_response_ms: u64,
    /// Down probes since the last up probe
    #[serde(default)]
    pub consecutive_fails: u32,
    /// Share of up probes, 0.0 to 100.0
    #[serde(default = "default_uptime")]
    pub uptime_percent: f64,
}

const fn default_uptime() -> f64 {
    100.0
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            last_checked_at: None,
            last_status: None,
            last_response_ms: 0,
            consecutive_fails: 0,
            uptime_percent: default_uptime(),
        }
    }
}

/// An external endpoint checked on its own cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorDefinition {
    /// Stable identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// URL for HTTP monitors, `host:port` for TCP monitors
    pub url: String,
    /// Check kind
    #[serde(default)]
    pub kind: MonitorKind,
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// Minimum time between two probes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-probe timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// HTTP status code that counts as up
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Disabled monitors are never probed
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Rolling state
    #[serde(default)]
    pub state: MonitorState,
}

impl MonitorDefinition {
    /// Creates an enabled HTTP monitor with default cadence
    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            kind: MonitorKind::Http,
            method: default_method(),
            interval_secs: default_interval_secs(),
            timeout_ms: default_timeout_ms(),
            expected_status: default_expected_status(),
            enabled: true,
            state: MonitorState::default(),
        }
    }

    /// Creates an enabled TCP monitor for `host:port`
    #[must_use]
    pub fn tcp(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: MonitorKind::Tcp,
            ..Self::http(name, address)
        }
    }

    /// Sets the probe interval
    #[must_use]
    pub const fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Sets the probe timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Sets the expected status code
    #[must_use]
    pub const fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Returns whether the monitor should be probed at `now`
    ///
    /// A monitor that was never checked is always due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_checked_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_milliseconds() >= (self.interval_secs as i64).saturating_mul(1000)
            }
        }
    }
}

/// One immutable observation of a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeProbe {
    /// Probe identifier
    pub id: Uuid,
    /// Owning monitor
    pub monitor_id: Uuid,
    /// When the probe started
    pub checked_at: DateTime<Utc>,
    /// Outcome
    pub status: ProbeStatus,
    /// Latency, measured regardless of outcome
    pub response_ms: u64,
    /// HTTP status code, when a response was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_never_checked_is_due() {
        let monitor = MonitorDefinition::http("api", "https://api.example.com/health");
        assert!(monitor.is_due(Utc::now()));
    }

    #[test]
    fn test_interval_gates_due() {
        let now = Utc::now();
        let mut monitor =
            MonitorDefinition::http("api", "https://api.example.com").with_interval_secs(60);
        monitor.state.last_checked_at = Some(now - Duration::seconds(30));
        assert!(!monitor.is_due(now));

        monitor.state.last_checked_at = Some(now - Duration::seconds(60));
        assert!(monitor.is_due(now));
    }

    #[test]
    fn test_monitor_defaults_from_toml() {
        let monitor: MonitorDefinition = toml::from_str(
            r#"
            name = "site"
            url = "https://example.com"
            "#,
        )
        .unwrap();

        assert_eq!(monitor.kind, MonitorKind::Http);
        assert_eq!(monitor.method, "GET");
        assert_eq!(monitor.interval_secs, 60);
        assert_eq!(monitor.timeout_ms, 5000);
        assert_eq!(monitor.expected_status, 200);
        assert!(monitor.enabled);
        assert!((monitor.state.uptime_percent - 100.0).abs() < f64::EPSILON);
    }
}
