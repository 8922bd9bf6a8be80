//! Vault key generation and secret encryption.

use std::io::BufRead;
use std::path::Path;

use fleetdeck_core::{AesGcmVault, ConfigPaths, TracingLevel};

use crate::error::CliError;
use crate::util::init_logging;

/// Prints a fresh vault key
pub fn cmd_keygen() -> Result<(), CliError> {
    let key = AesGcmVault::generate_key()?;
    println!("{key}");
    Ok(())
}

/// Encrypts one line from stdin with the configured vault key
pub fn cmd_encrypt(config_path: Option<&Path>, verbosity: Option<TracingLevel>) -> Result<(), CliError> {
    let settings = ConfigPaths::resolve(config_path)?.load_settings()?;
    init_logging(&settings, verbosity)?;

    let vault = AesGcmVault::from_env(&settings.vault_key_env)?;

    let mut secret = String::new();
    std::io::stdin().lock().read_line(&mut secret)?;
    let secret = secret.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        return Err(CliError::Credential("no secret given on stdin".to_string()));
    }

    println!("{}", vault.encrypt(secret)?);
    Ok(())
}
