//! In-memory store
//!
//! Backs every store trait with maps behind one lock. Used by the CLI,
//! which seeds it from the inventory file, and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CommandLog, HostDirectory, MetricsSink, MonitorDirectory, MonitorUpdate, SessionSink,
};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    CommandRecord, Host, HostStatus, MonitorDefinition, ProbeStatus, TerminalSession, UptimeProbe,
};
use crate::monitoring::MetricSample;

#[derive(Debug, Default)]
struct State {
    /// Hosts in insertion order
    hosts: Vec<Host>,
    monitors: Vec<MonitorDefinition>,
    probes: HashMap<Uuid, Vec<UptimeProbe>>,
    samples: Vec<MetricSample>,
    sessions: Vec<TerminalSession>,
    commands: Vec<CommandRecord>,
}

/// Store keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with hosts and monitors
    #[must_use]
    pub fn with_inventory(hosts: Vec<Host>, monitors: Vec<MonitorDefinition>) -> Self {
        Self {
            state: RwLock::new(State {
                hosts,
                monitors,
                ..State::default()
            }),
        }
    }

    /// Adds or replaces a host
    pub async fn upsert_host(&self, host: Host) {
        let mut state = self.state.write().await;
        match state.hosts.iter_mut().find(|h| h.id == host.id) {
            Some(existing) => *existing = host,
            None => state.hosts.push(host),
        }
    }

    /// Adds or replaces a monitor
    pub async fn upsert_monitor(&self, monitor: MonitorDefinition) {
        let mut state = self.state.write().await;
        match state.monitors.iter_mut().find(|m| m.id == monitor.id) {
            Some(existing) => *existing = monitor,
            None => state.monitors.push(monitor),
        }
    }

    /// Finds a host by name
    pub async fn find_host_by_name(&self, name: &str) -> Option<Host> {
        self.state
            .read()
            .await
            .hosts
            .iter()
            .find(|h| h.name == name)
            .cloned()
    }

    /// One monitor by id
    pub async fn get_monitor(&self, id: Uuid) -> StoreResult<MonitorDefinition> {
        self.state
            .read()
            .await
            .monitors
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| not_found("monitor", id))
    }

    /// All monitors, enabled or not
    pub async fn monitors(&self) -> Vec<MonitorDefinition> {
        self.state.read().await.monitors.clone()
    }

    /// Every stored sample, oldest first
    pub async fn all_samples(&self) -> Vec<MetricSample> {
        self.state.read().await.samples.clone()
    }

    /// Samples of one host, oldest first
    pub async fn samples_for(&self, host_id: Uuid) -> Vec<MetricSample> {
        self.state
            .read()
            .await
            .samples
            .iter()
            .filter(|s| s.host_id == host_id)
            .cloned()
            .collect()
    }

    /// Most recent sample of one host
    pub async fn latest_sample(&self, host_id: Uuid) -> Option<MetricSample> {
        self.state
            .read()
            .await
            .samples
            .iter()
            .rev()
            .find(|s| s.host_id == host_id)
            .cloned()
    }

    /// Samples of one host collected at or after `since`
    pub async fn samples_since(&self, host_id: Uuid, since: DateTime<Utc>) -> Vec<MetricSample> {
        self.state
            .read()
            .await
            .samples
            .iter()
            .filter(|s| s.host_id == host_id && s.collected_at >= since)
            .cloned()
            .collect()
    }

    /// Probes recorded for one monitor, oldest first
    pub async fn probes(&self, monitor_id: Uuid) -> Vec<UptimeProbe> {
        self.state
            .read()
            .await
            .probes
            .get(&monitor_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored terminal sessions
    pub async fn sessions(&self) -> Vec<TerminalSession> {
        self.state.read().await.sessions.clone()
    }

    /// Stored command records
    pub async fn commands(&self) -> Vec<CommandRecord> {
        self.state.read().await.commands.clone()
    }
}

fn not_found(kind: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl HostDirectory for MemoryStore {
    async fn list_hosts(&self) -> StoreResult<Vec<Host>> {
        Ok(self.state.read().await.hosts.clone())
    }

    async fn get_host(&self, id: Uuid) -> StoreResult<Host> {
        self.state
            .read()
            .await
            .hosts
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| not_found("host", id))
    }

    async fn set_status(&self, id: Uuid, status: HostStatus) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let host = state
            .hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| not_found("host", id))?;
        host.status = status;
        Ok(())
    }

    async fn set_last_connected(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let host = state
            .hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| not_found("host", id))?;
        host.last_connected_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl MonitorDirectory for MemoryStore {
    async fn list_enabled_monitors(&self) -> StoreResult<Vec<MonitorDefinition>> {
        Ok(self
            .state
            .read()
            .await
            .monitors
            .iter()
            .filter(|m| m.enabled)
            .cloned()
            .collect())
    }

    async fn record_probe(&self, probe: UptimeProbe) -> StoreResult<()> {
        self.state
            .write()
            .await
            .probes
            .entry(probe.monitor_id)
            .or_default()
            .push(probe);
        Ok(())
    }

    async fn probe_history(&self, monitor_id: Uuid) -> StoreResult<Vec<ProbeStatus>> {
        Ok(self
            .state
            .read()
            .await
            .probes
            .get(&monitor_id)
            .map(|probes| probes.iter().map(|p| p.status).collect())
            .unwrap_or_default())
    }

    async fn apply_probe(&self, monitor_id: Uuid, update: MonitorUpdate) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let monitor = state
            .monitors
            .iter_mut()
            .find(|m| m.id == monitor_id)
            .ok_or_else(|| not_found("monitor", monitor_id))?;

        let s = &mut monitor.state;
        s.last_checked_at = Some(update.checked_at);
        s.last_status = Some(update.status);
        s.last_response_ms = update.response_ms;
        s.uptime_percent = update.uptime_percent;
        s.consecutive_fails = update.consecutive_fails;
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for MemoryStore {
    async fn insert_sample(&self, sample: MetricSample) -> StoreResult<()> {
        self.state.write().await.samples.push(sample);
        Ok(())
    }
}

#[async_trait]
impl SessionSink for MemoryStore {
    async fn insert_session(&self, session: TerminalSession) -> StoreResult<()> {
        self.state.write().await.sessions.push(session);
        Ok(())
    }
}

#[async_trait]
impl CommandLog for MemoryStore {
    async fn insert_command(&self, record: CommandRecord) -> StoreResult<()> {
        self.state.write().await.commands.push(record);
        Ok(())
    }
}
