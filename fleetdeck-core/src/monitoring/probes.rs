//! Read-only probe commands and their parsers
//!
//! Each probe is one short shell command run in its own session. Parsers are
//! total: empty or malformed output leaves the corresponding field at zero.

use super::sample::MetricSample;

/// Two `/proc/stat` readings one second apart
pub const CPU_COMMAND: &str = "head -1 /proc/stat; sleep 1; head -1 /proc/stat";
/// Memory totals in MiB
pub const MEMORY_COMMAND: &str = "free -m";
/// Root filesystem usage in KiB, POSIX output format
pub const DISK_COMMAND: &str = "df -Pk /";
/// Load averages
pub const LOADAVG_COMMAND: &str = "cat /proc/loadavg";
/// Seconds since boot
pub const UPTIME_COMMAND: &str = "cat /proc/uptime";
/// Number of containers, running or not
pub const CONTAINERS_TOTAL_COMMAND: &str = "docker ps -aq 2>/dev/null | wc -l";
/// Number of running containers
pub const CONTAINERS_RUNNING_COMMAND: &str = "docker ps -q 2>/dev/null | wc -l";
/// Interface counters
pub const NETWORK_COMMAND: &str = "cat /proc/net/dev";

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// One entry of the probe battery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// CPU busy percentage
    Cpu,
    /// Memory used/total
    Memory,
    /// Root filesystem used/total
    Disk,
    /// Load averages
    LoadAverage,
    /// Uptime
    Uptime,
    /// Container count
    ContainersTotal,
    /// Running container count
    ContainersRunning,
    /// Cumulative network counters
    Network,
}

impl Probe {
    /// The battery, in execution order
    pub const ALL: [Self; 8] = [
        Self::Cpu,
        Self::Memory,
        Self::Disk,
        Self::LoadAverage,
        Self::Uptime,
        Self::ContainersTotal,
        Self::ContainersRunning,
        Self::Network,
    ];

    /// Shell command for this probe
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Cpu => CPU_COMMAND,
            Self::Memory => MEMORY_COMMAND,
            Self::Disk => DISK_COMMAND,
            Self::LoadAverage => LOADAVG_COMMAND,
            Self::Uptime => UPTIME_COMMAND,
            Self::ContainersTotal => CONTAINERS_TOTAL_COMMAND,
            Self::ContainersRunning => CONTAINERS_RUNNING_COMMAND,
            Self::Network => NETWORK_COMMAND,
        }
    }

    /// Parses `output` into the fields this probe owns
    pub fn apply(self, output: &str, sample: &mut MetricSample) {
        match self {
            Self::Cpu => sample.cpu_percent = parse_cpu_percent(output),
            Self::Memory => {
                let (used, total) = parse_memory(output);
                sample.memory_used_mb = used;
                sample.memory_total_mb = total;
            }
            Self::Disk => {
                let (used, total) = parse_disk(output);
                sample.disk_used_gb = used;
                sample.disk_total_gb = total;
            }
            Self::LoadAverage => {
                let (one, five, fifteen) = parse_loadavg(output);
                sample.load_avg_1m = one;
                sample.load_avg_5m = five;
                sample.load_avg_15m = fifteen;
            }
            Self::Uptime => sample.uptime_seconds = parse_uptime(output),
            Self::ContainersTotal => sample.container_count = parse_count(output),
            Self::ContainersRunning => sample.container_running = parse_count(output),
            Self::Network => {
                let (rx, tx) = parse_net_dev(output);
                sample.network_rx_bytes = rx;
                sample.network_tx_bytes = tx;
            }
        }
    }
}

/// Aggregate CPU counters from a `cpu ` line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSnapshot {
    /// Normal processes in user mode
    pub user: u64,
    /// Niced processes in user mode
    pub nice: u64,
    /// Kernel mode
    pub system: u64,
    /// Idle
    pub idle: u64,
    /// Waiting for I/O
    pub iowait: u64,
    /// Servicing interrupts
    pub irq: u64,
    /// Servicing softirqs
    pub softirq: u64,
    /// Stolen by the hypervisor
    pub steal: u64,
}

impl CpuSnapshot {
    /// Parses a `cpu  user nice system idle ...` line; missing fields are 0
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("cpu") {
            return None;
        }
        let mut field = || parts.next().and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        Some(Self {
            user: field(),
            nice: field(),
            system: field(),
            idle: field(),
            iowait: field(),
            irq: field(),
            softirq: field(),
            steal: field(),
        })
    }

    fn total(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    /// Busy percentage between `prev` and `self`
    #[must_use]
    pub fn cpu_percent_since(&self, prev: &Self) -> f64 {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }
        let idle_delta = self.idle_total().saturating_sub(prev.idle_total());
        let busy_delta = total_delta.saturating_sub(idle_delta);
        (busy_delta as f64 / total_delta as f64 * 100.0).clamp(0.0, 100.0)
    }
}

fn parse_f64(token: &str) -> f64 {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

/// CPU busy percentage from two `/proc/stat` readings
#[must_use]
pub fn parse_cpu_percent(output: &str) -> f64 {
    let snapshots: Vec<CpuSnapshot> = output.lines().filter_map(CpuSnapshot::parse).collect();
    match snapshots.as_slice() {
        [.., prev, next] => next.cpu_percent_since(prev),
        _ => 0.0,
    }
}

/// `(used, total)` MiB from the `Mem:` line of `free -m`
#[must_use]
pub fn parse_memory(output: &str) -> (f64, f64) {
    output
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("Mem:"))
        .map_or((0.0, 0.0), |rest| {
            let mut fields = rest.split_whitespace();
            let total = fields.next().map_or(0.0, parse_f64);
            let used = fields.next().map_or(0.0, parse_f64);
            (used, total)
        })
}

/// `(used, total)` GiB from `df -Pk` output
#[must_use]
pub fn parse_disk(output: &str) -> (f64, f64) {
    output
        .lines()
        .rev()
        .find_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let total = fields[1].parse::<u64>().ok()?;
            let used = fields[2].parse::<u64>().ok()?;
            Some((used as f64 / KIB_PER_GIB, total as f64 / KIB_PER_GIB))
        })
        .unwrap_or((0.0, 0.0))
}

/// `(1m, 5m, 15m)` from `/proc/loadavg`
#[must_use]
pub fn parse_loadavg(output: &str) -> (f64, f64, f64) {
    let mut fields = output.split_whitespace();
    let mut next = || fields.next().map_or(0.0, parse_f64);
    (next(), next(), next())
}

/// Whole seconds since boot from `/proc/uptime`
#[must_use]
pub fn parse_uptime(output: &str) -> u64 {
    output
        .split_whitespace()
        .next()
        .map_or(0.0, parse_f64)
        .floor() as u64
}

/// A single non-negative integer, e.g. from `wc -l`
#[must_use]
pub fn parse_count(output: &str) -> u64 {
    output
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// `(rx, tx)` bytes summed over all non-loopback interfaces of `/proc/net/dev`
#[must_use]
pub fn parse_net_dev(output: &str) -> (u64, u64) {
    let mut rx_total: u64 = 0;
    let mut tx_total: u64 = 0;

    for line in output.lines() {
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        let iface = iface.trim();
        if iface.is_empty() || iface == "lo" || iface.contains('|') {
            continue;
        }
        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        let rx = fields[0].parse::<u64>().unwrap_or(0);
        let tx = fields[8].parse::<u64>().unwrap_or(0);
        rx_total = rx_total.saturating_add(rx);
        tx_total = tx_total.saturating_add(tx);
    }

    (rx_total, tx_total)
}
