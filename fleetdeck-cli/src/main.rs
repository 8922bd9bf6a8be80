//! Fleetdeck CLI - command-line interface for the Fleetdeck remote host manager
//!
//! Lists hosts, tests connectivity, runs commands, collects metrics, checks
//! endpoint monitors, opens terminals and runs the background services.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = commands::dispatch(config_path, cli.verbosity(), cli.command);

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
