//! Probe monitors once.

use std::path::Path;
use std::sync::Arc;

use fleetdeck_core::{
    CheckerConfig, MonitorChecker, NetworkProber, ProbeStatus, TracingLevel, UptimeProbe,
};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{Context, create_runtime, print_json};

#[derive(Serialize)]
struct MonitorReport {
    monitor: String,
    url: String,
    probe: UptimeProbe,
    uptime_percent: f64,
}

/// Check command handler
pub fn cmd_check(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;
    let prober = NetworkProber::new()?;
    let checker = MonitorChecker::new(
        context.store.clone(),
        Arc::new(prober),
        CheckerConfig::from(&context.settings.monitor),
    );

    let runtime = create_runtime()?;
    let reports = runtime.block_on(async {
        let mut reports = Vec::new();
        for (monitor, probe) in checker.check_all().await {
            let uptime_percent = context
                .store
                .get_monitor(monitor.id)
                .await
                .map_or(monitor.state.uptime_percent, |m| m.state.uptime_percent);
            reports.push(MonitorReport {
                monitor: monitor.name,
                url: monitor.url,
                probe,
                uptime_percent,
            });
        }
        reports.sort_by(|a, b| a.monitor.cmp(&b.monitor));
        reports
    });

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Table => print_table(&reports),
    }
    Ok(())
}

fn print_table(reports: &[MonitorReport]) {
    const GREEN: &str = "\x1b[32m";
    const RED: &str = "\x1b[31m";
    const RESET: &str = "\x1b[0m";

    if reports.is_empty() {
        println!("No enabled monitors.");
        return;
    }

    for report in reports {
        let probe = &report.probe;
        let (color, mark) = match probe.status {
            ProbeStatus::Up => (GREEN, "UP  "),
            ProbeStatus::Down => (RED, "DOWN"),
        };
        print!(
            "{color}{mark}{RESET} {:<20} {:>6}ms  {:>6.2}%  {}",
            report.monitor, probe.response_ms, report.uptime_percent, report.url
        );
        if let Some(code) = probe.status_code {
            print!(" [{code}]");
        }
        if let Some(error) = &probe.error {
            print!(" - {error}");
        }
        println!();
    }
}
