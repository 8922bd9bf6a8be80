//! Run one command on a host.

use std::path::Path;
use std::time::Duration;

use fleetdeck_core::{CommandRunner, RetryConfig, TracingLevel, retry_connect};

use crate::error::CliError;
use crate::util::{Context, create_runtime};

/// Parameters for the exec command
pub struct ExecParams<'a> {
    pub name: &'a str,
    pub command: &'a str,
    pub timeout: u64,
    pub safe_only: bool,
    pub retries: u32,
}

/// Exec command handler
pub fn cmd_exec(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    params: ExecParams<'_>,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;
    let host = context.find_host(params.name)?.clone();

    let pool = context.pool();
    let runner = CommandRunner::new(
        pool.clone(),
        context.store.clone(),
        context.store.clone(),
        context.vault.clone(),
    );
    let timeout = Duration::from_secs(params.timeout);
    let retry = RetryConfig::default().with_max_retries(params.retries);

    let runtime = create_runtime()?;
    let result = runtime.block_on(async {
        let result = retry_connect(&retry, || async {
            if params.safe_only {
                runner.run_if_safe(host.id, params.command, timeout).await
            } else {
                runner.run(host.id, params.command, timeout).await
            }
        })
        .await;
        pool.shutdown().await;
        result
    });

    let record = result?;

    if !record.output.is_empty() {
        println!("{}", record.output.trim_end_matches('\n'));
    }
    tracing::debug!(
        exit_code = record.exit_code,
        duration_ms = record.duration_ms,
        "Command finished"
    );

    if record.exit_code == 0 {
        Ok(())
    } else {
        Err(CliError::Command(format!(
            "`{}` exited with status {}",
            record.command, record.exit_code
        )))
    }
}
