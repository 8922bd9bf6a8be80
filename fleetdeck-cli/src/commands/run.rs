//! Run the background services until interrupted.

use std::path::Path;
use std::sync::Arc;

use fleetdeck_core::{
    CheckerConfig, CollectorConfig, MetricsCollector, MonitorChecker, NetworkProber, TracingLevel,
};
use tracing::info;

use crate::error::CliError;
use crate::util::{Context, create_runtime};

/// Run command handler
pub fn cmd_run(config_path: Option<&Path>, verbosity: Option<TracingLevel>) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;
    let settings = &context.settings;

    let pool = context.pool();
    let collector = settings.metrics.enabled.then(|| {
        MetricsCollector::new(
            pool.clone(),
            context.store.clone(),
            context.store.clone(),
            context.vault.clone(),
            CollectorConfig::from(&settings.metrics),
        )
    });
    let checker = if settings.monitor.enabled {
        Some(MonitorChecker::new(
            context.store.clone(),
            Arc::new(NetworkProber::new()?),
            CheckerConfig::from(&settings.monitor),
        ))
    } else {
        None
    };

    let runtime = create_runtime()?;
    runtime.block_on(async {
        pool.start().await;
        if let Some(collector) = &collector {
            collector.start().await;
        }
        if let Some(checker) = &checker {
            checker.start().await;
        }
        info!(
            hosts = context.hosts.len(),
            metrics = collector.is_some(),
            monitors = checker.is_some(),
            "Services running, press Ctrl-C to stop"
        );

        let signal = tokio::signal::ctrl_c().await;

        info!("Stopping services");
        if let Some(checker) = &checker {
            checker.stop().await;
        }
        if let Some(collector) = &collector {
            collector.stop().await;
        }
        pool.shutdown().await;
        info!(
            samples = context.store.all_samples().await.len(),
            "Services stopped"
        );
        signal
    })?;

    Ok(())
}
