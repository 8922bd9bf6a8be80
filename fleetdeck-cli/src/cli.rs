//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fleetdeck_core::TracingLevel;

/// Fleetdeck command-line interface for managing remote hosts
#[derive(Parser)]
#[command(name = "fleetdeck")]
#[command(author, version, about = "Fleetdeck command-line interface")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "FLEETDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level requested on the command line, if any
    pub fn verbosity(&self) -> Option<TracingLevel> {
        if self.quiet {
            Some(TracingLevel::Error)
        } else if self.verbose > 0 {
            Some(TracingLevel::from_verbosity(self.verbose))
        } else {
            None
        }
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List inventory hosts
    #[command(about = "List all hosts in the inventory")]
    Hosts {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Classify a command line
    #[command(about = "Show how a command line would be classified")]
    Classify {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,

        /// Command line to classify
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Test host connectivity
    #[command(about = "Test connectivity to a host")]
    Test {
        /// Host name or ID (use "all" to test every host)
        name: String,

        /// Per-host timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Run one command on a host
    #[command(about = "Run a command on a host and print its output")]
    Exec {
        /// Host name or ID
        name: String,

        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Seconds to wait for the command
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Refuse commands not classified as safe
        #[arg(long)]
        safe_only: bool,

        /// Retries after a transient connection failure
        #[arg(long, default_value = "0")]
        retries: u32,
    },

    /// Collect metrics once
    #[command(about = "Collect resource metrics from one or all hosts")]
    Collect {
        /// Host name or ID; all hosts when omitted
        name: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Check monitors once
    #[command(about = "Probe every enabled monitor once")]
    Check {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Open an interactive terminal
    #[command(about = "Open a line-oriented terminal on a host (`:resize C R` resizes)")]
    Terminal {
        /// Host name or ID
        name: String,
    },

    /// Run background services
    #[command(about = "Run the metrics collector and monitor checker until Ctrl-C")]
    Run,

    /// Credential vault tooling
    #[command(subcommand)]
    Vault(VaultCommands),
}

/// Vault subcommands
#[derive(Subcommand)]
pub enum VaultCommands {
    /// Generate a new vault key
    #[command(about = "Print a new random vault key")]
    Keygen,

    /// Encrypt a secret for the inventory
    #[command(about = "Encrypt a secret read from stdin with the configured vault key")]
    Encrypt,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON
    Json,
}
