//! Development [`SecretDecryptor`] for the service binary and tests.
//!
//! | Type | Use | Security |
//! |------|-----|---------|
//! | [`PlaintextSecretDecryptor`] | Dev / CI with base64-encoded secrets | Not for production |
//!
//! Production deployments supply a decryptor backed by the platform's key
//! management service.

use crate::tenant::{DecryptError, EncryptedSecret, SecretDecryptor, SecretValue};
use crate::TenantId;
use async_trait::async_trait;
use base64::Engine;
use tracing::warn;

/// Treats stored "ciphertext" as base64-encoded plaintext.
///
/// **Development and testing only.** A `WARN` line is emitted on construction
/// so operators notice it before going to production.
pub struct PlaintextSecretDecryptor {
    _private: (),
}

impl PlaintextSecretDecryptor {
    pub fn new() -> Self {
        warn!(
            "PlaintextSecretDecryptor is active: tenant secrets are only base64-encoded \
             and are not safe for production"
        );
        Self { _private: () }
    }

    /// Encode a plaintext secret the way this decryptor expects it stored
    pub fn encode(plaintext: &str) -> EncryptedSecret {
        EncryptedSecret::new(base64::engine::general_purpose::STANDARD.encode(plaintext))
    }
}

impl Default for PlaintextSecretDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaintextSecretDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaintextSecretDecryptor").finish()
    }
}

#[async_trait]
impl SecretDecryptor for PlaintextSecretDecryptor {
    async fn decrypt(
        &self,
        _tenant_id: &TenantId,
        secret: &EncryptedSecret,
    ) -> Result<SecretValue, DecryptError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(secret.ciphertext().trim())
            .map_err(|e| DecryptError::InvalidCiphertext {
                message: e.to_string(),
            })?;

        if bytes.is_empty() {
            return Err(DecryptError::InvalidCiphertext {
                message: "decoded secret is empty".to_string(),
            });
        }

        Ok(SecretValue::from_bytes(bytes))
    }
}

#[cfg(test)]
#[path = "plaintext_decryptor_tests.rs"]
mod tests;
