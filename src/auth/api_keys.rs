//! API key generation and verification (spec §4.3)
//!
//! Keys are opaque, high-entropy tokens in the form `{prefix}_{random}`.
//! Unlike user passwords, API keys carry their own entropy, so instead of
//! Argon2id we use a salted SHA-256 digest (`sha2`, already pulled in for
//! content-addressed ids) keyed by `GatewayConfig::auth_api_key_salt` —
//! cheap to verify on every request without weakening the security margin,
//! since the key itself is never guessable.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A tenant-scoped API key record, as persisted by `repository::api_keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub prefix: String,
    pub key_hash: String,
    pub is_revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_valid(&self) -> bool {
        !self.is_revoked
    }
}

/// Generates and verifies API keys for a given prefix (e.g. `gw_live`).
#[derive(Clone)]
pub struct ApiKeyGenerator {
    prefix: String,
    salt: String,
}

impl ApiKeyGenerator {
    pub fn new(prefix: impl Into<String>, salt: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), salt: salt.into() }
    }

    /// Returns `(plaintext_key, salted_hash)`. The plaintext is shown to the
    /// caller exactly once; only the hash is persisted.
    pub fn generate(&self) -> (String, String) {
        let mut random_bytes = [0u8; 24];
        rand::rng().fill_bytes(&mut random_bytes);
        let encoded = base32_encode(&random_bytes);
        let key = format!("{}_{}", self.prefix, encoded);
        let hash = self.hash(&key);
        (key, hash)
    }

    pub fn hash(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, key: &str, hash: &str) -> Result<bool> {
        Ok(self.hash(key) == hash)
    }

    /// First 8 chars of the random part, used as a cheap DB lookup index
    /// without storing (or scanning for) the full key.
    pub fn lookup_prefix(key: &str) -> Option<String> {
        let parts: Vec<&str> = key.rsplitn(2, '_').collect();
        if parts.len() == 2 && parts[0].len() >= 8 {
            Some(format!("{}_{}", parts[1], &parts[0][..8]))
        } else {
            None
        }
    }
}

fn base32_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut result = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer = 0u64;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u64;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

/// Tenant/key id extracted from a validated bearer token, attached to the
/// request as an axum extension by `middleware::auth`.
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant {
    pub tenant_id: String,
    pub api_key_id: String,
}

pub fn require_salt_len(salt: &str) -> Result<()> {
    if salt.len() < 16 {
        return Err(Error::Internal("auth_api_key_salt too short".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_verify_roundtrip() {
        let gen = ApiKeyGenerator::new("gw_live", "0123456789abcdef");
        let (key, hash) = gen.generate();
        assert!(key.starts_with("gw_live_"));
        assert!(gen.verify(&key, &hash).unwrap());
        assert!(!gen.verify("wrong_key", &hash).unwrap());
    }

    #[test]
    fn hash_is_deterministic_for_same_salt() {
        let gen = ApiKeyGenerator::new("gw_live", "fixed-salt-value");
        let hash_a = gen.hash("gw_live_abc123");
        let hash_b = gen.hash("gw_live_abc123");
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        let gen_a = ApiKeyGenerator::new("gw_live", "salt-one-value12");
        let gen_b = ApiKeyGenerator::new("gw_live", "salt-two-value12");
        assert_ne!(gen_a.hash("gw_live_abc"), gen_b.hash("gw_live_abc"));
    }

    #[test]
    fn lookup_prefix_uses_first_eight_chars() {
        let lookup = ApiKeyGenerator::lookup_prefix("gw_live_abcdefghijklmnop");
        assert_eq!(lookup, Some("gw_live_abcdefgh".to_string()));
    }
}
