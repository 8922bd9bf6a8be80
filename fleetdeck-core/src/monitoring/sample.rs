//! Metric samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One point-in-time observation of a host
///
/// Memory and disk are absolute usage at sample time. Network counters are
/// cumulative since host boot; use [`NetworkRate::between`] for rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Sample identifier
    pub id: Uuid,
    /// Observed host
    pub host_id: Uuid,
    /// When collection started
    pub collected_at: DateTime<Utc>,
    /// CPU busy percentage over a one second window
    pub cpu_percent: f64,
    /// Used memory in MiB
    pub memory_used_mb: f64,
    /// Total memory in MiB
    pub memory_total_mb: f64,
    /// Used space on `/` in GiB
    pub disk_used_gb: f64,
    /// Size of `/` in GiB
    pub disk_total_gb: f64,
    /// 1 minute load average
    pub load_avg_1m: f64,
    /// 5 minute load average
    pub load_avg_5m: f64,
    /// 15 minute load average
    pub load_avg_15m: f64,
    /// Seconds since boot
    pub uptime_seconds: u64,
    /// All containers
    pub container_count: u64,
    /// Running containers
    pub container_running: u64,
    /// Received bytes since boot, loopback excluded
    pub network_rx_bytes: u64,
    /// Transmitted bytes since boot, loopback excluded
    pub network_tx_bytes: u64,
}

impl MetricSample {
    /// Creates an all-zero sample for `host_id` stamped now
    #[must_use]
    pub fn empty(host_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_id,
            collected_at: Utc::now(),
            cpu_percent: 0.0,
            memory_used_mb: 0.0,
            memory_total_mb: 0.0,
            disk_used_gb: 0.0,
            disk_total_gb: 0.0,
            load_avg_1m: 0.0,
            load_avg_5m: 0.0,
            load_avg_15m: 0.0,
            uptime_seconds: 0,
            container_count: 0,
            container_running: 0,
            network_rx_bytes: 0,
            network_tx_bytes: 0,
        }
    }

    /// Memory usage percentage (0 when the total is unknown)
    #[must_use]
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_mb, self.memory_total_mb)
    }

    /// Disk usage percentage (0 when the total is unknown)
    #[must_use]
    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_gb, self.disk_total_gb)
    }
}

fn percent(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        (used / total * 100.0).clamp(0.0, 100.0)
    }
}

/// Network throughput derived from two samples of the same host
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkRate {
    /// Received bytes per second
    pub rx_bytes_per_sec: f64,
    /// Transmitted bytes per second
    pub tx_bytes_per_sec: f64,
}

impl NetworkRate {
    /// Rate between `prev` and `next`
    ///
    /// Returns `None` when the samples are not in time order. A counter
    /// that went backwards (host reboot) yields 0 for that direction.
    #[must_use]
    pub fn between(prev: &MetricSample, next: &MetricSample) -> Option<Self> {
        let elapsed = next
            .collected_at
            .signed_duration_since(prev.collected_at)
            .num_milliseconds();
        if elapsed <= 0 {
            return None;
        }
        let secs = elapsed as f64 / 1000.0;
        Some(Self {
            rx_bytes_per_sec: next.network_rx_bytes.saturating_sub(prev.network_rx_bytes) as f64
                / secs,
            tx_bytes_per_sec: next.network_tx_bytes.saturating_sub(prev.network_tx_bytes) as f64
                / secs,
        })
    }
}
