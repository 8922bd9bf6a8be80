//! Endpoint uptime monitoring

mod checker;
mod prober;
mod window;

pub use checker::{CheckerConfig, MonitorChecker};
pub use prober::{EndpointProber, NetworkProber, ProbeResult};
pub use window::{DEFAULT_UPTIME_WINDOW, UptimeWindow, consecutive_failures, uptime_percent};
