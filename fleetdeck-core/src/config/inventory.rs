//! Host and monitor inventory (`inventory.toml`)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::models::{AuthMethod, Host, MonitorDefinition};
use crate::store::MemoryStore;

/// Hosts and monitors known to the tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    /// `[[hosts]]`
    pub hosts: Vec<Host>,
    /// `[[monitors]]`
    pub monitors: Vec<MonitorDefinition>,
}

impl Inventory {
    /// Parses and validates an inventory
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for duplicate names or missing fields.
    pub fn from_toml(text: &str, origin: &str) -> ConfigResult<Self> {
        let inventory: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Serializes the inventory back to TOML
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if serialization fails.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Checks names, addresses and auth material
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() || host.host.trim().is_empty() {
                return Err(ConfigError::Invalid("host entries need a name and an address".into()));
            }
            if host.username.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("host '{}' has no username", host.name)));
            }
            if host.port == 0 {
                return Err(ConfigError::Invalid(format!("host '{}' has port 0", host.name)));
            }
            if host.auth == AuthMethod::Password && host.encrypted_password.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "host '{}' uses password auth without encrypted_password",
                    host.name
                )));
            }
            if !names.insert(host.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate host name '{}'", host.name)));
            }
        }

        let mut names = HashSet::new();
        for monitor in &self.monitors {
            if monitor.name.trim().is_empty() || monitor.url.trim().is_empty() {
                return Err(ConfigError::Invalid("monitor entries need a name and a url".into()));
            }
            if monitor.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "monitor '{}' has timeout_ms 0",
                    monitor.name
                )));
            }
            if !names.insert(monitor.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate monitor name '{}'",
                    monitor.name
                )));
            }
        }
        Ok(())
    }

    /// Seeds an in-memory store with this inventory
    #[must_use]
    pub fn into_store(self) -> MemoryStore {
        MemoryStore::with_inventory(self.hosts, self.monitors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonitorKind;

    const SAMPLE: &str = r#"
        [[hosts]]
        name = "web"
        host = "10.0.0.5"
        username = "deploy"
        encrypted_password = "00ff"

        [[hosts]]
        name = "db"
        host = "db.internal"
        port = 2222
        username = "ops"
        auth = "key"
        identity_file = "~/.ssh/id_ed25519"

        [[monitors]]
        name = "api"
        url = "https://api.example.com/health"

        [[monitors]]
        name = "postgres"
        url = "db.internal:5432"
        kind = "tcp"
        interval_secs = 30
    "#;

    #[test]
    fn test_parse_sample() {
        let inventory = Inventory::from_toml(SAMPLE, "inventory.toml").unwrap();
        assert_eq!(inventory.hosts.len(), 2);
        assert_eq!(inventory.hosts[0].port, 22);
        assert_eq!(inventory.hosts[0].auth, AuthMethod::Password);
        assert_eq!(inventory.hosts[1].auth, AuthMethod::Key);
        assert_ne!(inventory.hosts[0].id, inventory.hosts[1].id);

        assert_eq!(inventory.monitors[0].method, "GET");
        assert_eq!(inventory.monitors[0].expected_status, 200);
        assert!(inventory.monitors[0].enabled);
        assert_eq!(inventory.monitors[1].kind, MonitorKind::Tcp);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
            [[hosts]]
            name = "web"
            host = "a"
            username = "u"
            encrypted_password = "x"

            [[hosts]]
            name = "web"
            host = "b"
            username = "u"
            encrypted_password = "x"
        "#;
        assert!(matches!(
            Inventory::from_toml(text, "i"),
            Err(ConfigError::Invalid(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_password_host_needs_secret() {
        let text = r#"
            [[hosts]]
            name = "web"
            host = "a"
            username = "u"
        "#;
        assert!(Inventory::from_toml(text, "i").is_err());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let inventory = Inventory::from_toml(SAMPLE, "inventory.toml").unwrap();
        let text = inventory.to_toml().unwrap();
        assert_eq!(Inventory::from_toml(&text, "again").unwrap(), inventory);
    }
}
