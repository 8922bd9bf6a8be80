//! Uptime ratio policy

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::ProbeStatus;

/// Default number of trailing probes considered
pub const DEFAULT_UPTIME_WINDOW: usize = 100;

/// Which probes an uptime ratio is computed over
///
/// Serialized as `"all"` or a positive probe count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeWindow {
    /// The most recent `n` probes
    Trailing(usize),
    /// Every probe ever recorded
    AllTime,
}

impl Default for UptimeWindow {
    fn default() -> Self {
        Self::Trailing(DEFAULT_UPTIME_WINDOW)
    }
}

impl fmt::Display for UptimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trailing(n) => write!(f, "{n}"),
            Self::AllTime => write!(f, "all"),
        }
    }
}

impl FromStr for UptimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::AllTime);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("uptime window must be positive".to_string()),
            Ok(n) => Ok(Self::Trailing(n)),
            Err(_) => Err(format!("invalid uptime window '{s}'")),
        }
    }
}

impl Serialize for UptimeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Trailing(n) => serializer.serialize_u64(*n as u64),
            Self::AllTime => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for UptimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Self::from_str(&n.to_string()),
            Raw::Text(s) => Self::from_str(&s),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Percentage of `up` probes in `history` (oldest first) under `window`
///
/// Returns 100.0 when there are no probes. The result depends only on the
/// slice contents, so recomputing over the same history is stable.
#[must_use]
pub fn uptime_percent(history: &[ProbeStatus], window: UptimeWindow) -> f64 {
    let considered = match window {
        UptimeWindow::Trailing(n) => &history[history.len().saturating_sub(n)..],
        UptimeWindow::AllTime => history,
    };
    if considered.is_empty() {
        return 100.0;
    }
    let up = considered.iter().filter(|s| s.is_up()).count();
    up as f64 / considered.len() as f64 * 100.0
}

/// Length of the run of `down` probes at the end of `history`
#[must_use]
pub fn consecutive_failures(history: &[ProbeStatus]) -> u32 {
    let run = history.iter().rev().take_while(|s| !s.is_up()).count();
    u32::try_from(run).unwrap_or(u32::MAX)
}
