//! Periodic endpoint checking
//!
//! A coarse scan tick walks the enabled monitors; each monitor is probed
//! only once its own interval has elapsed since its last check.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::prober::EndpointProber;
use super::window::{UptimeWindow, consecutive_failures, uptime_percent};
use crate::models::{MonitorDefinition, UptimeProbe};
use crate::store::{MonitorDirectory, MonitorUpdate};
use crate::tracing::span_names;

/// Checker timing and uptime policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Time between scans
    pub scan_interval: Duration,
    /// Probes considered for the uptime ratio
    pub window: UptimeWindow,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            window: UptimeWindow::default(),
        }
    }
}

struct CheckerInner {
    monitors: Arc<dyn MonitorDirectory>,
    prober: Arc<dyn EndpointProber>,
    config: CheckerConfig,
    in_flight: StdMutex<HashSet<Uuid>>,
    tasks: Mutex<JoinSet<()>>,
    stop_tx: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Probes monitored endpoints on their own cadence
#[derive(Clone)]
pub struct MonitorChecker {
    inner: Arc<CheckerInner>,
}

impl std::fmt::Debug for MonitorChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorChecker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct InFlightGuard {
    inner: Arc<CheckerInner>,
    monitor_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.monitor_id);
    }
}

impl MonitorChecker {
    /// Creates a stopped checker
    #[must_use]
    pub fn new(
        monitors: Arc<dyn MonitorDirectory>,
        prober: Arc<dyn EndpointProber>,
        config: CheckerConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CheckerInner {
                monitors,
                prober,
                config,
                in_flight: StdMutex::new(HashSet::new()),
                tasks: Mutex::new(JoinSet::new()),
                stop_tx,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Starts scanning: one scan immediately, then one per scan interval
    pub async fn start(&self) {
        let mut ticker_slot = self.inner.ticker.lock().await;
        if ticker_slot.is_some() || *self.inner.stop_tx.borrow() {
            return;
        }

        let period = self.inner.config.scan_interval.max(Duration::from_secs(1));
        let mut stop = self.inner.stop_tx.subscribe();
        let checker = self.clone();

        *ticker_slot = Some(tokio::spawn(async move {
            checker.check_now().await;

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        checker.check_now().await;
                    }
                }
            }
        }));

        info!(scan_secs = period.as_secs(), window = %self.inner.config.window, "Monitor checker started");
    }

    /// Stops scanning and waits for in-flight probes
    pub async fn stop(&self) {
        let _ = self.inner.stop_tx.send(true);

        if let Some(handle) = self.inner.ticker.lock().await.take() {
            let _ = handle.await;
        }

        let mut tasks = self.inner.tasks.lock().await;
        while tasks.join_next().await.is_some() {}

        info!("Monitor checker stopped");
    }

    /// Launches a probe task for every due monitor; returns how many
    pub async fn check_now(&self) -> usize {
        let due = self.due_monitors().await;

        let mut tasks = self.inner.tasks.lock().await;
        while tasks.try_join_next().is_some() {}

        let mut launched = 0;
        for monitor in due {
            let newly_added = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(monitor.id);
            if !newly_added {
                continue;
            }

            let guard = InFlightGuard {
                inner: Arc::clone(&self.inner),
                monitor_id: monitor.id,
            };
            let checker = self.clone();
            tasks.spawn(async move {
                let _guard = guard;
                checker.check_monitor(&monitor).await;
            });
            launched += 1;
        }
        launched
    }

    /// Probes every due monitor concurrently and waits for the results
    pub async fn check_all(&self) -> Vec<(MonitorDefinition, UptimeProbe)> {
        let mut set = JoinSet::new();
        for monitor in self.due_monitors().await {
            let checker = self.clone();
            set.spawn(async move {
                let probe = checker.check_monitor(&monitor).await;
                (monitor, probe)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }
        results
    }

    /// Probes one monitor and folds the result into its rolling state
    pub async fn check_monitor(&self, monitor: &MonitorDefinition) -> UptimeProbe {
        let span = info_span!(span_names::MONITOR_CHECK, monitor = %monitor.name);
        self.check_monitor_inner(monitor).instrument(span).await
    }

    async fn check_monitor_inner(&self, monitor: &MonitorDefinition) -> UptimeProbe {
        let checked_at = Utc::now();
        let result = self.inner.prober.probe(monitor).await;

        let probe = UptimeProbe {
            id: Uuid::new_v4(),
            monitor_id: monitor.id,
            checked_at,
            status: result.status,
            response_ms: result.response_ms,
            status_code: result.status_code,
            error: result.error,
        };
        debug!(status = %probe.status, response_ms = probe.response_ms, "Monitor probed");

        if let Err(e) = self.inner.monitors.record_probe(probe.clone()).await {
            warn!(error = %e, "Failed to store monitor probe");
            return probe;
        }

        let history = match self.inner.monitors.probe_history(monitor.id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load probe history");
                return probe;
            }
        };

        let update = MonitorUpdate {
            checked_at,
            status: probe.status,
            response_ms: probe.response_ms,
            uptime_percent: uptime_percent(&history, self.inner.config.window),
            consecutive_fails: consecutive_failures(&history),
        };
        if let Err(e) = self.inner.monitors.apply_probe(monitor.id, update).await {
            warn!(error = %e, "Failed to update monitor state");
        }
        probe
    }

    async fn due_monitors(&self) -> Vec<MonitorDefinition> {
        let monitors = match self.inner.monitors.list_enabled_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                warn!(error = %e, "Cannot list monitors");
                return Vec::new();
            }
        };
        let now = Utc::now();
        monitors.into_iter().filter(|m| m.is_due(now)).collect()
    }
}
