//! Credential vault
//!
//! Hosts carry their password or private key encrypted. A
//! [`CredentialVault`] turns that ciphertext into a [`SecretString`] right
//! before dialing; nothing else in the core sees plaintext secrets.

use async_trait::async_trait;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{CredentialError, CredentialResult};
use crate::models::{AuthMethod, Host};
use crate::transport::Credentials;

/// Default environment variable holding the hex vault key
pub const DEFAULT_VAULT_KEY_ENV: &str = "FLEETDECK_VAULT_KEY";

/// Turns stored ciphertext into plaintext secrets
#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Decrypts one stored secret
    ///
    /// # Errors
    ///
    /// Returns an error when the ciphertext is malformed or fails
    /// authentication.
    async fn decrypt(&self, ciphertext: &str) -> CredentialResult<SecretString>;
}

/// AES-256-GCM vault keyed by a 32-byte key
///
/// Ciphertext format: lowercase hex of `nonce (12 bytes) || sealed || tag`.
pub struct AesGcmVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for AesGcmVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmVault").finish_non_exhaustive()
    }
}

impl AesGcmVault {
    /// Creates a vault from a 64-character hex key
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidKey`] unless the key decodes to
    /// exactly 32 bytes.
    pub fn from_hex(key_hex: &str) -> CredentialResult<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| CredentialError::InvalidKey(format!("not hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(CredentialError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, &bytes)
            .map_err(|_| CredentialError::InvalidKey("rejected by AES-256-GCM".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Creates a vault from the key stored in environment variable `var`
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidKey`] when the variable is unset or
    /// does not hold a valid key.
    pub fn from_env(var: &str) -> CredentialResult<Self> {
        let value = std::env::var(var)
            .map_err(|_| CredentialError::InvalidKey(format!("environment variable {var} is not set")))?;
        Self::from_hex(&value)
    }

    /// Generates a fresh random key, hex encoded
    ///
    /// # Errors
    ///
    /// Returns an error when the system RNG fails.
    pub fn generate_key() -> CredentialResult<String> {
        let mut key = [0u8; 32];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CredentialError::InvalidKey("system RNG failed".to_string()))?;
        Ok(hex::encode(key))
    }

    /// Encrypts `plaintext` with a random nonce
    ///
    /// # Errors
    ///
    /// Returns an error when the system RNG or the cipher fails.
    pub fn encrypt(&self, plaintext: &str) -> CredentialResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CredentialError::Malformed("failed to generate nonce".to_string()))?;

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| CredentialError::Malformed("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    fn open(&self, ciphertext: &str) -> CredentialResult<String> {
        let data = hex::decode(ciphertext.trim())
            .map_err(|e| CredentialError::Malformed(format!("not hex: {e}")))?;
        if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CredentialError::Malformed("ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CredentialError::Malformed("bad nonce".to_string()))?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CredentialError::DecryptFailed)?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CredentialError::Malformed("plaintext is not UTF-8".to_string()))
    }
}

#[async_trait]
impl CredentialVault for AesGcmVault {
    async fn decrypt(&self, ciphertext: &str) -> CredentialResult<SecretString> {
        self.open(ciphertext).map(SecretString::from)
    }
}

/// Vault that stores secrets in clear text; for local development only
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextVault;

#[async_trait]
impl CredentialVault for PlaintextVault {
    async fn decrypt(&self, ciphertext: &str) -> CredentialResult<SecretString> {
        Ok(SecretString::from(ciphertext.to_string()))
    }
}

/// Vault without a usable key; every decrypt fails with the load error
///
/// Lets hosts that need no stored secret (agent or identity file) work
/// while the vault key is absent.
#[derive(Debug, Clone)]
pub struct LockedVault {
    reason: CredentialError,
}

impl LockedVault {
    /// Creates a vault that reports `reason` on every decrypt
    #[must_use]
    pub const fn new(reason: CredentialError) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl CredentialVault for LockedVault {
    async fn decrypt(&self, _ciphertext: &str) -> CredentialResult<SecretString> {
        Err(self.reason.clone())
    }
}

/// Decrypts the secrets a host needs according to its auth method
///
/// Password hosts require `encrypted_password`. Key hosts use, in order, an
/// encrypted inline key, a local identity file (with `~` expanded), or the
/// SSH agent.
///
/// # Errors
///
/// Returns a credential error before any network attempt when a required
/// secret is missing or cannot be decrypted.
pub async fn resolve_credentials(
    host: &Host,
    vault: &dyn CredentialVault,
) -> CredentialResult<Credentials> {
    match host.auth {
        AuthMethod::Password => {
            let ciphertext = host.encrypted_password.as_deref().ok_or_else(|| {
                CredentialError::Missing(format!("password for host '{}'", host.name))
            })?;
            let password = vault.decrypt(ciphertext).await?;
            Ok(Credentials::Password(password))
        }
        AuthMethod::Key => {
            if let Some(ciphertext) = host.encrypted_private_key.as_deref() {
                let key = vault.decrypt(ciphertext).await?;
                if key.expose_secret().trim().is_empty() {
                    return Err(CredentialError::Missing(format!(
                        "private key for host '{}'",
                        host.name
                    )));
                }
                return Ok(Credentials::PrivateKey(key));
            }
            if let Some(path) = &host.identity_file {
                let raw = path.to_string_lossy();
                let expanded = shellexpand::tilde(&raw).into_owned();
                return Ok(Credentials::IdentityFile(expanded.into()));
            }
            debug!(host = %host.name, "No key material configured, using SSH agent");
            Ok(Credentials::Agent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        let ciphertext = vault.encrypt("s3cret").unwrap();
        assert_ne!(ciphertext, "s3cret");

        let plaintext = vault.decrypt(&ciphertext).await.unwrap();
        assert_eq!(plaintext.expose_secret(), "s3cret");
    }

    #[test]
    fn test_nonce_is_random() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        assert_ne!(vault.encrypt("x").unwrap(), vault.encrypt("x").unwrap());
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            AesGcmVault::from_hex("abcd"),
            Err(CredentialError::InvalidKey(_))
        ));
        assert!(matches!(
            AesGcmVault::from_hex("zz"),
            Err(CredentialError::InvalidKey(_))
        ));
        let generated = AesGcmVault::generate_key().unwrap();
        assert_eq!(generated.len(), 64);
        assert!(AesGcmVault::from_hex(&generated).is_ok());
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_authentication() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        let mut bytes = hex::decode(vault.encrypt("s3cret").unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let err = vault.decrypt(&hex::encode(bytes)).await.unwrap_err();
        assert_eq!(err, CredentialError::DecryptFailed);
    }

    #[tokio::test]
    async fn test_wrong_key_fails() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        let other = AesGcmVault::from_hex(&AesGcmVault::generate_key().unwrap()).unwrap();
        let ciphertext = vault.encrypt("s3cret").unwrap();
        assert_eq!(
            other.decrypt(&ciphertext).await.unwrap_err(),
            CredentialError::DecryptFailed
        );
    }

    #[tokio::test]
    async fn test_malformed_ciphertext() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        assert!(matches!(
            vault.decrypt("nothex").await,
            Err(CredentialError::Malformed(_))
        ));
        assert!(matches!(
            vault.decrypt("00ff").await,
            Err(CredentialError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_locked_vault_only_fails_when_used() {
        let vault = LockedVault::new(CredentialError::InvalidKey("unset".into()));
        let mut agent = Host::new("db", "db.local", "ops");
        agent.auth = AuthMethod::Key;
        assert!(matches!(
            resolve_credentials(&agent, &vault).await,
            Ok(Credentials::Agent)
        ));

        let web = Host::new("web", "web.local", "deploy").with_encrypted_password("00ff");
        assert_eq!(
            resolve_credentials(&web, &vault).await.unwrap_err(),
            CredentialError::InvalidKey("unset".into())
        );
    }

    #[tokio::test]
    async fn test_resolve_password_host() {
        let host = Host::new("web", "web.local", "deploy").with_encrypted_password("hunter2");
        let creds = resolve_credentials(&host, &PlaintextVault).await.unwrap();
        match creds {
            Credentials::Password(p) => assert_eq!(p.expose_secret(), "hunter2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_password_host_without_secret() {
        let host = Host::new("web", "web.local", "deploy");
        assert!(matches!(
            resolve_credentials(&host, &PlaintextVault).await,
            Err(CredentialError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_key_host_fallbacks() {
        let inline = Host::new("a", "a", "u").with_encrypted_private_key("-----BEGIN KEY-----");
        assert!(matches!(
            resolve_credentials(&inline, &PlaintextVault).await.unwrap(),
            Credentials::PrivateKey(_)
        ));

        let file = Host::new("b", "b", "u").with_identity_file("/etc/ssh/id_test");
        match resolve_credentials(&file, &PlaintextVault).await.unwrap() {
            Credentials::IdentityFile(path) => assert_eq!(path, std::path::PathBuf::from("/etc/ssh/id_test")),
            other => panic!("unexpected {other:?}"),
        }

        let mut agent = Host::new("c", "c", "u");
        agent.auth = AuthMethod::Key;
        assert!(matches!(
            resolve_credentials(&agent, &PlaintextVault).await.unwrap(),
            Credentials::Agent
        ));
    }

    #[tokio::test]
    async fn test_decrypt_failure_surfaces() {
        let vault = AesGcmVault::from_hex(KEY).unwrap();
        let host = Host::new("web", "web.local", "deploy").with_encrypted_password("00");
        assert!(resolve_credentials(&host, &vault).await.is_err());
    }
}
