// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signing-key resolution and HMAC signatures over canonical payloads.
//!
//! Secrets are opaque byte strings supplied through the environment; key
//! management proper lives outside the core. The env var for a key id is
//! `MACE_KEY_{key_id}` with every non-alphanumeric character mapped to `_`.

use mace_canon::{CanonError, canonical_serialize};
use mace_determinism::hmac_sha256_hex;
use serde::Serialize;

/// Errors from signing-key resolution.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// No secret was found and development fallbacks are disabled.
    #[error("no signing secret for key id {key_id} (looked for ${env_var})")]
    MissingSecret {
        /// The unresolvable key id.
        key_id: String,
        /// Environment variable that was consulted.
        env_var: String,
    },

    /// Canonical serialization of the payload failed.
    #[error(transparent)]
    Canon(#[from] CanonError),
}

/// Resolves signing secrets from the environment.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    allow_dev_secrets: bool,
}

impl SecretResolver {
    /// Strict resolver: a missing env var is an error.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            allow_dev_secrets: false,
        }
    }

    /// Dev/CI resolver: a missing env var falls back to the deterministic
    /// `test_secret_for_{key_id}` secret.
    #[must_use]
    pub fn with_dev_fallback() -> Self {
        Self {
            allow_dev_secrets: true,
        }
    }

    /// Resolve the secret bytes for `key_id`.
    ///
    /// # Errors
    ///
    /// [`SigningError::MissingSecret`] when the env var is unset and the
    /// dev fallback is disabled.
    pub fn resolve(&self, key_id: &str) -> Result<Vec<u8>, SigningError> {
        let env_var = env_var_for(key_id);
        if let Ok(secret) = std::env::var(&env_var) {
            return Ok(secret.into_bytes());
        }
        if self.allow_dev_secrets {
            tracing::warn!(key_id, "using development signing secret");
            return Ok(format!("test_secret_for_{key_id}").into_bytes());
        }
        Err(SigningError::MissingSecret {
            key_id: key_id.to_string(),
            env_var,
        })
    }
}

/// Environment variable name carrying the secret for `key_id`.
#[must_use]
pub fn env_var_for(key_id: &str) -> String {
    let sanitized: String = key_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("MACE_KEY_{sanitized}")
}

/// Hex HMAC-SHA256 signature over the canonical form of `payload`.
///
/// # Errors
///
/// Propagates [`CanonError`] from serialization.
pub fn sign_payload<T: Serialize>(secret: &[u8], payload: &T) -> Result<String, SigningError> {
    let canonical = canonical_serialize(payload)?;
    Ok(hmac_sha256_hex(secret, canonical.as_bytes()))
}

/// Verify a hex signature over the canonical form of `payload`.
///
/// Malformed signatures verify as false rather than erroring.
#[must_use]
pub fn verify_signature<T: Serialize>(secret: &[u8], payload: &T, signature: &str) -> bool {
    match sign_payload(secret, payload) {
        // Signatures are hex digests of fixed length; a plain comparison of
        // recomputed-vs-stored does not leak secret material.
        Ok(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
