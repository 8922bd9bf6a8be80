//! Test host connectivity command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleetdeck_core::{ConnectionTester, OpenSshDialer, TestResult, TestSummary, TracingLevel};

use crate::error::CliError;
use crate::util::{Context, create_runtime};

/// Test connectivity command handler
pub fn cmd_test(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    name: &str,
    timeout: u64,
) -> Result<(), CliError> {
    let context = Context::load(config_path, verbosity)?;

    if context.hosts.is_empty() {
        if name.eq_ignore_ascii_case("all") {
            println!("No hosts configured.");
            return Ok(());
        }
        return Err(CliError::HostNotFound(name.to_string()));
    }

    let timeout = Duration::from_secs(timeout);
    let dialer = OpenSshDialer::new().with_connect_timeout(timeout);
    let tester = ConnectionTester::new(
        Arc::new(dialer),
        context.store.clone(),
        Arc::clone(&context.vault),
    )
    .with_timeout(timeout);

    let runtime = create_runtime()?;

    if name.eq_ignore_ascii_case("all") {
        println!("Testing {} hosts...\n", context.hosts.len());

        let summary = runtime.block_on(tester.test_batch(&context.hosts));

        for result in &summary.results {
            print_test_result(result);
        }

        println!();
        print_test_summary(&summary);

        if !summary.all_passed() {
            return Err(CliError::TestFailed(format!(
                "{} of {} tests failed",
                summary.failed, summary.total
            )));
        }
    } else {
        let host = context.find_host(name)?;

        println!("Testing host '{}'...\n", host.name);

        let result = runtime.block_on(tester.test_host(host));
        print_test_result(&result);

        if !result.success {
            return Err(CliError::TestFailed(
                result.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
    }

    Ok(())
}

/// Print a single test result with colors
fn print_test_result(result: &TestResult) {
    const GREEN: &str = "\x1b[32m";
    const RED: &str = "\x1b[31m";
    const YELLOW: &str = "\x1b[33m";
    const CYAN: &str = "\x1b[36m";
    const RESET: &str = "\x1b[0m";
    const BOLD: &str = "\x1b[1m";

    if result.success {
        print!("{GREEN}{BOLD}✓{RESET} {}", result.host_name);
        if let Some(latency) = result.latency_ms {
            print!(" {CYAN}({latency}ms){RESET}");
        }
        println!();
    } else {
        print!("{RED}{BOLD}✗{RESET} {}", result.host_name);
        if let Some(ref error) = result.error {
            print!(" {YELLOW}- {error}{RESET}");
        }
        println!();
    }
}

/// Print the test summary with colors
fn print_test_summary(summary: &TestSummary) {
    const GREEN: &str = "\x1b[32m";
    const RED: &str = "\x1b[31m";
    const RESET: &str = "\x1b[0m";
    const BOLD: &str = "\x1b[1m";

    println!("{BOLD}Test Summary:{RESET}");
    println!("  Total:  {}", summary.total);

    if summary.passed > 0 {
        println!("  {GREEN}Passed: {}{RESET}", summary.passed);
    } else {
        println!("  Passed: {}", summary.passed);
    }

    if summary.failed > 0 {
        println!("  {RED}Failed: {}{RESET}", summary.failed);
    } else {
        println!("  Failed: {}", summary.failed);
    }

    let pass_rate = summary.pass_rate();
    if pass_rate >= 100.0 {
        println!("  {GREEN}Pass rate: {pass_rate:.1}%{RESET}");
    } else if pass_rate >= 50.0 {
        println!("  Pass rate: {pass_rate:.1}%");
    } else {
        println!("  {RED}Pass rate: {pass_rate:.1}%{RESET}");
    }
}
