//! List inventory hosts.

use std::path::Path;

use fleetdeck_core::TracingLevel;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{Context, print_json};

/// Hosts command handler
pub fn cmd_hosts(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;

    if let OutputFormat::Json = format {
        return print_json(&context.hosts);
    }

    if context.hosts.is_empty() {
        println!("No hosts configured.");
        return Ok(());
    }

    let name_width = context
        .hosts
        .iter()
        .map(|h| h.name.len())
        .max()
        .unwrap_or(0)
        .max(4);

    println!(
        "{:<name_width$}  {:<28}  {:<12}  {:<8}  {:<7}  ID",
        "NAME", "ADDRESS", "USER", "AUTH", "STATUS"
    );
    for host in &context.hosts {
        println!(
            "{:<name_width$}  {:<28}  {:<12}  {:<8}  {:<7}  {}",
            host.name,
            host.key().to_string(),
            host.username,
            host.auth.to_string(),
            host.status.to_string(),
            host.id
        );
    }
    Ok(())
}
