//! At-rest protection for sensitive sender properties.
//!
//! A property is sensitive when its normalized key (lowercase, ASCII
//! alphanumerics only) contains one of the configured matchers. Its string value
//! is stored as `enc:<base64 nonce>:<base64 ciphertext>`, sealed with AES-256-GCM
//! under the SHA-256 digest of the configured secret. Nested objects and arrays
//! are walked; everything else passes through untouched.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_common::config::AppConfig;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const ENCRYPTED_PREFIX: &str = "enc:";

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Property '{0}' is not a well-formed encrypted value")]
    Malformed(String),

    #[error("Property '{0}' could not be decrypted with the configured secret")]
    Decrypt(String),

    #[error("Property '{0}' could not be encrypted")]
    Encrypt(String),
}

#[derive(Clone)]
pub struct PropertyCrypto {
    cipher: Aes256Gcm,
    matchers: Vec<String>,
}

impl std::fmt::Debug for PropertyCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyCrypto")
            .field("matchers", &self.matchers)
            .finish_non_exhaustive()
    }
}

impl PropertyCrypto {
    pub fn new(secret: &str, sensitive_keys: &[String]) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
            matchers: sensitive_keys
                .iter()
                .map(|k| normalize_key(k))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// `None` when no `PROPERTY_ENCRYPTION_SECRET` is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config
            .property_secret
            .as_deref()
            .map(|secret| Self::new(secret, &config.sensitive_property_keys))
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let normalized = normalize_key(key);
        self.matchers.iter().any(|m| normalized.contains(m.as_str()))
    }

    /// Seal every plaintext sensitive value. Already sealed and blank values are kept.
    pub fn encrypt_sensitive(&self, properties: &Value) -> Result<Value, CryptoError> {
        self.walk(properties, &|key, value| self.seal(key, value))
    }

    /// Open every sealed sensitive value. Plaintext values are kept as they are.
    pub fn decrypt_sensitive(&self, properties: &Value) -> Result<Value, CryptoError> {
        self.walk(properties, &|key, value| self.open(key, value))
    }

    fn walk(
        &self,
        value: &Value,
        transform: &dyn Fn(&str, &str) -> Result<String, CryptoError>,
    ) -> Result<Value, CryptoError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let next = match value {
                        Value::String(s) if self.is_sensitive(key) => {
                            Value::String(transform(key, s)?)
                        }
                        other => self.walk(other, transform)?,
                    };
                    out.insert(key.clone(), next);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, transform))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn seal(&self, key: &str, value: &str) -> Result<String, CryptoError> {
        if value.trim().is_empty() || value.starts_with(ENCRYPTED_PREFIX) {
            return Ok(value.to_string());
        }
        let nonce: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
            .map_err(|_| CryptoError::Encrypt(key.to_string()))?;
        Ok(format!(
            "{ENCRYPTED_PREFIX}{}:{}",
            STANDARD.encode(nonce),
            STANDARD.encode(sealed)
        ))
    }

    fn open(&self, key: &str, value: &str) -> Result<String, CryptoError> {
        let Some(payload) = value.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(value.to_string());
        };
        let malformed = || CryptoError::Malformed(key.to_string());
        let (nonce, sealed) = payload.split_once(':').ok_or_else(malformed)?;
        let nonce = STANDARD.decode(nonce).map_err(|_| malformed())?;
        let sealed = STANDARD.decode(sealed).map_err(|_| malformed())?;
        if nonce.len() != NONCE_LEN {
            return Err(malformed());
        }
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| CryptoError::Decrypt(key.to_string()))?;
        String::from_utf8(plain).map_err(|_| CryptoError::Decrypt(key.to_string()))
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
