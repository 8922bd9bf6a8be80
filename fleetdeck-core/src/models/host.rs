//! Managed host model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pool::ConnectionKey;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How the pool authenticates against a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Password authentication
    #[default]
    Password,
    /// Public key authentication (inline key, identity file or agent)
    Key,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password => write!(f, "password"),
            Self::Key => write!(f, "key"),
        }
    }
}

/// Reachability as last observed by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    /// Last acquisition succeeded
    Online,
    /// Last acquisition failed
    Offline,
    /// Never checked
    #[default]
    Unknown,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// A remote host reachable over SSH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Stable identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Hostname or IP address
    pub host: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    pub username: String,
    /// Authentication method
    #[serde(default)]
    pub auth: AuthMethod,
    /// Vault-encrypted password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_password: Option<String>,
    /// Vault-encrypted private key (PEM/OpenSSH format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
    /// Private key file on the local machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    /// Reachability status
    #[serde(default)]
    pub status: HostStatus,
    /// End of the last interactive terminal session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Host {
    /// Creates a password-authenticated host with a fresh identifier
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            auth: AuthMethod::Password,
            encrypted_password: None,
            encrypted_private_key: None,
            identity_file: None,
            status: HostStatus::Unknown,
            last_connected_at: None,
        }
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the encrypted password and switches to password authentication
    #[must_use]
    pub fn with_encrypted_password(mut self, ciphertext: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password;
        self.encrypted_password = Some(ciphertext.into());
        self
    }

    /// Sets the encrypted private key and switches to key authentication
    #[must_use]
    pub fn with_encrypted_private_key(mut self, ciphertext: impl Into<String>) -> Self {
        self.auth = AuthMethod::Key;
        self.encrypted_private_key = Some(ciphertext.into());
        self
    }

    /// Sets a local identity file and switches to key authentication
    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::Key;
        self.identity_file = Some(path.into());
        self
    }

    /// Returns the pool key for this host
    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_defaults_from_toml() {
        let host: Host = toml::from_str(
            r#"
            name = "web-1"
            host = "10.0.0.5"
            username = "deploy"
            "#,
        )
        .unwrap();

        assert_eq!(host.port, DEFAULT_SSH_PORT);
        assert_eq!(host.auth, AuthMethod::Password);
        assert_eq!(host.status, HostStatus::Unknown);
        assert!(host.last_connected_at.is_none());
    }

    #[test]
    fn test_key_auth_from_toml() {
        let host: Host = toml::from_str(
            r#"
            name = "db"
            host = "db.internal"
            port = 2222
            username = "root"
            auth = "key"
            identity_file = "~/.ssh/id_ed25519"
            "#,
        )
        .unwrap();

        assert_eq!(host.auth, AuthMethod::Key);
        assert_eq!(host.key().to_string(), "db.internal:2222");
    }

    #[test]
    fn test_builders_switch_auth_method() {
        let host = Host::new("a", "a.example", "u").with_identity_file("/tmp/key");
        assert_eq!(host.auth, AuthMethod::Key);

        let host = host.with_encrypted_password("abcd");
        assert_eq!(host.auth, AuthMethod::Password);
    }
}
