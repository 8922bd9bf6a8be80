//! Configuration loading
//!
//! A configuration directory holds `config.toml` (settings) and
//! `inventory.toml` (hosts and monitors). Both files are optional; missing
//! files yield defaults and an empty inventory.

mod inventory;
mod settings;

use std::path::{Path, PathBuf};

use tracing::debug;

pub use inventory::Inventory;
pub use settings::{
    LoggingSettings, MetricsSettings, MonitorSettings, PoolSettings, Settings, TerminalSettings,
};

use crate::error::{ConfigError, ConfigResult};

/// Settings file name inside the configuration directory
pub const SETTINGS_FILE: &str = "config.toml";

/// Inventory file name inside the configuration directory
pub const INVENTORY_FILE: &str = "inventory.toml";

/// Expands a leading `~` in `path`
#[must_use]
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Locates and reads the configuration directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    /// Uses `dir` as the configuration directory
    #[must_use]
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: expand_path(dir.as_ref()),
        }
    }

    /// The platform configuration directory, `$XDG_CONFIG_HOME/fleetdeck` on Linux
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the platform has no such directory.
    pub fn default_dir() -> ConfigResult<Self> {
        dirs::config_dir()
            .map(|dir| Self {
                dir: dir.join("fleetdeck"),
            })
            .ok_or_else(|| ConfigError::Invalid("cannot determine configuration directory".into()))
    }

    /// `dir` when given, otherwise [`default_dir`](Self::default_dir)
    ///
    /// # Errors
    ///
    /// As [`default_dir`](Self::default_dir).
    pub fn resolve(dir: Option<&Path>) -> ConfigResult<Self> {
        match dir {
            Some(dir) => Ok(Self::with_dir(dir)),
            None => Self::default_dir(),
        }
    }

    /// Configuration directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `config.toml`
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    /// Path of `inventory.toml`
    #[must_use]
    pub fn inventory_file(&self) -> PathBuf {
        self.dir.join(INVENTORY_FILE)
    }

    /// Loads settings, defaulting when the file is absent
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_settings(&self) -> ConfigResult<Settings> {
        let path = self.settings_file();
        match read_optional(&path)? {
            Some(text) => Settings::from_toml(&text, &path.display().to_string()),
            None => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Settings::default())
            }
        }
    }

    /// Loads the inventory, empty when the file is absent
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_inventory(&self) -> ConfigResult<Inventory> {
        let path = self.inventory_file();
        match read_optional(&path)? {
            Some(text) => Inventory::from_toml(&text, &path.display().to_string()),
            None => {
                debug!(path = %path.display(), "No inventory file");
                Ok(Inventory::default())
            }
        }
    }
}

fn read_optional(path: &Path) -> ConfigResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}
