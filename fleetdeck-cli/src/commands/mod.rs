//! Command handler modules for the CLI.

mod check;
mod classify;
mod collect;
mod exec;
mod hosts;
mod run;
mod terminal;
mod test;
mod vault;

use std::path::Path;

use fleetdeck_core::TracingLevel;

use crate::cli::{Commands, VaultCommands};
use crate::error::CliError;

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(
    config_path: Option<&Path>,
    verbosity: Option<TracingLevel>,
    command: Commands,
) -> Result<(), CliError> {
    match command {
        Commands::Hosts { format } => hosts::cmd_hosts(config_path, verbosity, format),
        Commands::Classify { format, command } => classify::cmd_classify(&command.join(" "), format),
        Commands::Test { name, timeout } => test::cmd_test(config_path, verbosity, &name, timeout),
        Commands::Exec {
            name,
            command,
            timeout,
            safe_only,
            retries,
        } => exec::cmd_exec(
            config_path,
            verbosity,
            exec::ExecParams {
                name: &name,
                command: &command.join(" "),
                timeout,
                safe_only,
                retries,
            },
        ),
        Commands::Collect { name, format } => {
            collect::cmd_collect(config_path, verbosity, name.as_deref(), format)
        }
        Commands::Check { format } => check::cmd_check(config_path, verbosity, format),
        Commands::Terminal { name } => terminal::cmd_terminal(config_path, verbosity, &name),
        Commands::Run => run::cmd_run(config_path, verbosity),
        Commands::Vault(VaultCommands::Keygen) => vault::cmd_keygen(),
        Commands::Vault(VaultCommands::Encrypt) => vault::cmd_encrypt(config_path, verbosity),
    }
}
