//! Password credentials: salt generation, PBKDF2 hashing and verification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as base64;
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Pbkdf2 as Pbkdf2Config;

const MIN_HASH_LENGTH: usize = 16;
const MIN_SALT_LENGTH: usize = 16;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("pbkdf2 parameters are invalid: {0}")]
    InvalidParameters(String),
    #[error("salt is not valid base64")]
    Salt(#[from] base64::DecodeError),
}

/// Per-user random salt.
///
/// Persisted as standard base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Decode a base64 encoded [`Salt`].
    pub fn parse(encoded: &str) -> Result<Self> {
        Ok(Self(base64.decode(encoded)?))
    }

    /// Raw salt bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<String> for Salt {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Salt> for String {
    fn from(salt: Salt) -> Self {
        base64.encode(salt.0)
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Salt").field("value", &"[REDACTED]").finish()
    }
}

/// A derived password hash, base64 encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Password manager using PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    iterations: u32,
    hash_length: usize,
    salt_length: usize,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<Pbkdf2Config>) -> Result<Self> {
        let config = config.unwrap_or_default();

        if config.iterations == 0 {
            return Err(CryptoError::InvalidParameters(
                "at least one iteration is required".into(),
            ));
        }
        if config.hash_length < MIN_HASH_LENGTH {
            return Err(CryptoError::InvalidParameters(format!(
                "hash length must be at least {MIN_HASH_LENGTH} bytes"
            )));
        }
        if config.salt_length < MIN_SALT_LENGTH {
            return Err(CryptoError::InvalidParameters(format!(
                "salt length must be at least {MIN_SALT_LENGTH} bytes"
            )));
        }

        Ok(Self {
            iterations: config.iterations,
            hash_length: config.hash_length,
            salt_length: config.salt_length,
        })
    }

    /// Generate a fresh salt from the OS random source.
    pub fn generate_salt(&self) -> Salt {
        let mut bytes = vec![0u8; self.salt_length];
        OsRng.fill_bytes(&mut bytes);
        Salt(bytes)
    }

    /// Derive the hash of `password` under `salt`.
    pub fn hash(&self, salt: &Salt, password: impl AsRef<[u8]>) -> PasswordHash {
        let mut output = vec![0u8; self.hash_length];
        pbkdf2::<Hmac<Sha256>>(
            password.as_ref(),
            salt.as_bytes(),
            self.iterations,
            &mut output,
        );

        PasswordHash(base64.encode(output))
    }

    /// Check `candidate` against a stored hash.
    pub fn verify(
        &self,
        salt: &Salt,
        stored: &PasswordHash,
        candidate: impl AsRef<[u8]>,
    ) -> bool {
        let computed = self.hash(salt, candidate);
        constant_time_eq::constant_time_eq(
            computed.as_str().as_bytes(),
            stored.as_str().as_bytes(),
        )
    }
}

#[cfg(test)]
pub(crate) fn test_manager() -> PasswordManager {
    PasswordManager::new(Some(Pbkdf2Config {
        iterations: 1_000,
        ..Default::default()
    }))
    .unwrap()
}
