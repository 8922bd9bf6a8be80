//! Persistence collaborators
//!
//! The core reads hosts and monitors and writes one row per observation.
//! Schema ownership stays with the implementor of these traits.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use crate::models::{
    CommandRecord, Host, HostStatus, MonitorDefinition, ProbeStatus, TerminalSession, UptimeProbe,
};
use crate::monitoring::MetricSample;

/// Read access to hosts plus the two status fields the core maintains
#[async_trait]
pub trait HostDirectory: Send + Sync {
    /// All configured hosts
    async fn list_hosts(&self) -> StoreResult<Vec<Host>>;

    /// One host by id
    async fn get_host(&self, id: Uuid) -> StoreResult<Host>;

    /// Records reachability
    async fn set_status(&self, id: Uuid, status: HostStatus) -> StoreResult<()>;

    /// Records the end of an interactive session
    async fn set_last_connected(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Outcome of one probe, applied atomically to a monitor's rolling state
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorUpdate {
    /// Probe time
    pub checked_at: DateTime<Utc>,
    /// Probe outcome
    pub status: ProbeStatus,
    /// Probe latency
    pub response_ms: u64,
    /// Recomputed uptime percentage
    pub uptime_percent: f64,
    /// Down probes in a row, ending with this one
    pub consecutive_fails: u32,
}

/// Monitor definitions and their probe history
#[async_trait]
pub trait MonitorDirectory: Send + Sync {
    /// Monitors with `enabled = true`
    async fn list_enabled_monitors(&self) -> StoreResult<Vec<MonitorDefinition>>;

    /// Appends one probe
    async fn record_probe(&self, probe: UptimeProbe) -> StoreResult<()>;

    /// Probe statuses for a monitor, oldest first
    async fn probe_history(&self, monitor_id: Uuid) -> StoreResult<Vec<ProbeStatus>>;

    /// Overwrites the monitor's rolling state with a probe outcome
    async fn apply_probe(&self, monitor_id: Uuid, update: MonitorUpdate) -> StoreResult<()>;
}

/// Sink for metric samples
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Inserts one sample
    async fn insert_sample(&self, sample: MetricSample) -> StoreResult<()>;
}

/// Sink for terminal session summaries
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Inserts one session summary
    async fn insert_session(&self, session: TerminalSession) -> StoreResult<()>;
}

/// Sink for one-shot command results
#[async_trait]
pub trait CommandLog: Send + Sync {
    /// Inserts one command record
    async fn insert_command(&self, record: CommandRecord) -> StoreResult<()>;
}
