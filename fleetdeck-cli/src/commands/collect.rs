//! Collect metrics once.

use std::path::Path;

use fleetdeck_core::{
    CollectionOutcome, CollectorConfig, Host, MetricSample, MetricsCollector, TracingLevel,
};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{Context, create_runtime, print_json};

#[derive(Serialize)]
struct HostReport<'a> {
    host: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample: Option<&'a MetricSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> HostReport<'a> {
    fn new(host: &'a Host, outcome: &'a CollectionOutcome) -> Self {
        let (status, sample, error) = match outcome {
            CollectionOutcome::Collected(sample) => ("collected", Some(sample.as_ref()), None),
            CollectionOutcome::Offline(e) => ("offline", None, Some(e.to_string())),
            CollectionOutcome::CredentialFailed(e) => ("credentials", None, Some(e.to_string())),
        };
        Self {
            host: &host.name,
            status,
            sample,
            error,
        }
    }
}

/// Collect command handler
pub fn cmd_collect(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;
    let target = name.map(|n| context.find_host(n)).transpose()?.cloned();

    let pool = context.pool();
    let collector = MetricsCollector::new(
        pool.clone(),
        context.store.clone(),
        context.store.clone(),
        context.vault.clone(),
        CollectorConfig::from(&context.settings.metrics),
    );

    let runtime = create_runtime()?;
    let mut results = runtime.block_on(async {
        let results = match target {
            Some(host) => {
                let outcome = collector.collect_host(&host).await;
                vec![(host, outcome)]
            }
            None => collector.collect_all().await,
        };
        pool.shutdown().await;
        results
    });
    results.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    let reports: Vec<HostReport<'_>> = results
        .iter()
        .map(|(host, outcome)| HostReport::new(host, outcome))
        .collect();

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Table => print_table(&reports),
    }

    let failed = reports.iter().filter(|r| r.sample.is_none()).count();
    if failed > 0 {
        return Err(CliError::Connection(format!(
            "{failed} of {} hosts could not be collected",
            reports.len()
        )));
    }
    Ok(())
}

fn print_table(reports: &[HostReport<'_>]) {
    if reports.is_empty() {
        println!("No hosts configured.");
        return;
    }

    println!(
        "{:<16}  {:>6}  {:>6}  {:>6}  {:>16}  {:>10}  {:>9}",
        "HOST", "CPU%", "MEM%", "DISK%", "LOAD", "UPTIME", "CONTAINERS"
    );
    for report in reports {
        match (report.sample, &report.error) {
            (Some(s), _) => println!(
                "{:<16}  {:>6.1}  {:>6.1}  {:>6.1}  {:>16}  {:>10}  {:>9}",
                report.host,
                s.cpu_percent,
                s.memory_percent(),
                s.disk_percent(),
                format!("{:.2} {:.2} {:.2}", s.load_avg_1m, s.load_avg_5m, s.load_avg_15m),
                format_uptime(s.uptime_seconds),
                format!("{}/{}", s.container_running, s.container_count),
            ),
            (None, error) => println!(
                "{:<16}  {} ({})",
                report.host,
                report.status,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours}h {minutes}m")
    }
}
