//! Pool key

use serde::{Deserialize, Serialize};

/// Identity of one remote target, independent of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    /// Hostname or IP address
    pub host: String,
    /// SSH port
    pub port: u16,
}

impl ConnectionKey {
    /// Creates a key
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Canonical `host:port` form; IPv6 literals are bracketed
impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ConnectionKey::new("web-1", 22).to_string(), "web-1:22");
        assert_eq!(ConnectionKey::new("::1", 2222).to_string(), "[::1]:2222");
    }

    #[test]
    fn test_user_is_not_part_of_identity() {
        let a = ConnectionKey::new("10.0.0.1", 22);
        let b = ConnectionKey::new("10.0.0.1", 22);
        assert_eq!(a, b);
        assert_ne!(a, ConnectionKey::new("10.0.0.1", 2222));
    }
}
