//! Classify a command line without running it.

use fleetdeck_core::classify;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::print_json;

/// Classify command handler
pub fn cmd_classify(command: &str, format: OutputFormat) -> Result<(), CliError> {
    let verdict = classify(command);

    match format {
        OutputFormat::Json => print_json(&verdict)?,
        OutputFormat::Table => {
            println!("Command:   {}", verdict.base_command);
            println!("Arguments: {}", verdict.arguments.join(" "));
            println!("Safe:      {}", if verdict.is_safe { "yes" } else { "no" });
            println!("Category:  {}", verdict.category);
        }
    }
    Ok(())
}
