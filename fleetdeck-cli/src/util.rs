//! Shared utility functions used across command modules.

use std::path::Path;
use std::sync::Arc;

use fleetdeck_core::tracing::TracingError;
use fleetdeck_core::{
    AesGcmVault, ConfigPaths, ConnectionPool, CredentialVault, Host, Inventory, LockedVault,
    MemoryStore, OpenSshDialer, PoolConfig, Settings, TracingLevel, init_tracing,
};
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Everything a command needs from the configuration directory
pub struct Context {
    pub settings: Settings,
    pub hosts: Vec<Host>,
    pub store: Arc<MemoryStore>,
    pub vault: Arc<dyn CredentialVault>,
}

impl Context {
    /// Loads settings and inventory and installs logging
    pub fn load(config_path: Option<&Path>, verbosity: Option<TracingLevel>) -> Result<Self, CliError> {
        let paths = ConfigPaths::resolve(config_path)?;
        let settings = paths.load_settings()?;
        init_logging(&settings, verbosity)?;

        let inventory = paths.load_inventory()?;
        tracing::debug!(
            dir = %paths.dir().display(),
            hosts = inventory.hosts.len(),
            monitors = inventory.monitors.len(),
            "Configuration loaded"
        );

        let vault = open_vault(&settings);
        let hosts = inventory.hosts.clone();
        Ok(Self {
            settings,
            hosts,
            store: Arc::new(Inventory::into_store(inventory)),
            vault,
        })
    }

    /// Creates a connection pool over the system `ssh` client
    pub fn pool(&self) -> ConnectionPool {
        let config = PoolConfig::from(&self.settings.pool);
        let dialer = OpenSshDialer::new().with_connect_timeout(config.dial_timeout);
        ConnectionPool::new(Arc::new(dialer), config)
    }

    /// Finds a host by name or UUID
    pub fn find_host(&self, name_or_id: &str) -> Result<&Host, CliError> {
        find_host(&self.hosts, name_or_id)
    }
}

/// Installs the tracing subscriber described by the settings
pub fn init_logging(settings: &Settings, verbosity: Option<TracingLevel>) -> Result<(), CliError> {
    match init_tracing(&settings.logging.tracing_config(verbosity)) {
        Ok(()) | Err(TracingError::AlreadyInitialized) => Ok(()),
        Err(e) => Err(CliError::Config(e.to_string())),
    }
}

/// Opens the vault keyed by the configured environment variable
///
/// Without a key, hosts that need no stored secret still work; the others
/// fail when their credentials are resolved.
pub fn open_vault(settings: &Settings) -> Arc<dyn CredentialVault> {
    match AesGcmVault::from_env(&settings.vault_key_env) {
        Ok(vault) => Arc::new(vault),
        Err(e) => {
            tracing::debug!(error = %e, "Vault key unavailable");
            Arc::new(LockedVault::new(e))
        }
    }
}

/// Creates the async runtime used by one command
pub fn create_runtime() -> Result<Runtime, CliError> {
    Runtime::new().map_err(|e| CliError::Config(format!("Failed to create async runtime: {e}")))
}

/// Prints `value` as pretty JSON
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Config(format!("Failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Find a host by name or UUID
pub fn find_host<'a>(hosts: &'a [Host], name_or_id: &str) -> Result<&'a Host, CliError> {
    // First try to find by exact name match
    if let Some(host) = hosts.iter().find(|h| h.name == name_or_id) {
        return Ok(host);
    }

    if let Ok(uuid) = uuid::Uuid::parse_str(name_or_id) {
        if let Some(host) = hosts.iter().find(|h| h.id == uuid) {
            return Ok(host);
        }
    }

    if let Some(host) = hosts
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name_or_id))
    {
        return Ok(host);
    }

    // Try partial name match (prefix)
    let prefix = name_or_id.to_lowercase();
    let matches: Vec<_> = hosts
        .iter()
        .filter(|h| h.name.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::HostNotFound(name_or_id.to_string())),
        [host] => Ok(*host),
        _ => {
            let names: Vec<_> = matches.iter().map(|h| h.name.as_str()).collect();
            Err(CliError::Config(format!(
                "Ambiguous host name '{}'. Matches: {}",
                name_or_id,
                names.join(", ")
            )))
        }
    }
}
