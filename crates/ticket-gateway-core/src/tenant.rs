//! # Tenant Credentials
//!
//! Resolution of tenant identifiers to tool credentials.
//!
//! Stored tenant records ([`TenantToolConfig`]) only ever hold ciphertext.
//! [`TenantCredentialStore::resolve`] decrypts through a [`SecretDecryptor`] and
//! hands the caller a [`TenantCredentials`] value whose secrets are zeroized
//! when it is dropped. Nothing in this module caches decrypted material.

use crate::{ErrorCategory, TenantId, ToolType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;
use zeroize::Zeroizing;

// ============================================================================
// Secret containers
// ============================================================================

/// Ciphertext of a tenant secret as held by the configuration store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    /// Ciphertext for the decryptor
    pub fn ciphertext(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedSecret(<REDACTED>)")
    }
}

/// Decrypted secret material
///
/// The buffer is zeroized on drop and never printed.
#[derive(Clone)]
pub struct SecretValue {
    inner: Zeroizing<Vec<u8>>,
}

impl SecretValue {
    pub fn from_bytes(value: Vec<u8>) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    pub fn from_string(value: String) -> Self {
        Self::from_bytes(value.into_bytes())
    }

    /// Get secret bytes (only for immediate use)
    pub fn expose_secret(&self) -> &[u8] {
        &self.inner
    }

    /// Get secret as UTF-8 text, if it is valid UTF-8
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.inner).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Tenant records
// ============================================================================

/// Stored tool configuration for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantToolConfig {
    pub tenant_id: TenantId,
    pub tool_type: ToolType,
    pub base_url: Url,

    /// Account name for tools using Basic auth; not secret
    #[serde(default)]
    pub api_username: Option<String>,

    pub api_credential: EncryptedSecret,
    pub webhook_secret: EncryptedSecret,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Decrypted, call-scoped credentials for one tenant
///
/// Dropping the value zeroizes both secrets. Do not store it beyond the
/// operation that requested it.
#[derive(Debug)]
pub struct TenantCredentials {
    pub tenant_id: TenantId,
    pub tool_type: ToolType,
    pub base_url: Url,
    pub api_username: Option<String>,
    pub api_token: SecretValue,
    pub webhook_secret: SecretValue,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the external configuration source
#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantStoreError {
    #[error("Tenant configuration source unavailable: {message}")]
    Unavailable { message: String },

    #[error("Tenant configuration is invalid: {message}")]
    InvalidRecord { message: String },
}

/// Errors from the external decryption service
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecryptError {
    #[error("Ciphertext could not be decrypted: {message}")]
    InvalidCiphertext { message: String },

    #[error("Decryption service unavailable: {message}")]
    Unavailable { message: String },
}

/// Tenant resolution failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantError {
    #[error("Tenant '{tenant_id}' not found")]
    NotFound { tenant_id: TenantId },

    #[error("Tenant '{tenant_id}' is inactive")]
    Inactive { tenant_id: TenantId },

    #[error("Credentials for tenant '{tenant_id}' could not be decrypted")]
    Decryption {
        tenant_id: TenantId,
        #[source]
        source: DecryptError,
    },

    #[error("Tenant store error: {0}")]
    Store(#[from] TenantStoreError),
}

impl TenantError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(TenantStoreError::Unavailable { .. }) => true,
            Self::Decryption {
                source: DecryptError::Unavailable { .. },
                ..
            } => true,
            _ => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::Inactive { .. } | Self::Decryption { .. } => {
                ErrorCategory::Security
            }
            Self::Store(TenantStoreError::Unavailable { .. }) => ErrorCategory::Transient,
            Self::Store(TenantStoreError::InvalidRecord { .. }) => ErrorCategory::Configuration,
        }
    }
}

// ============================================================================
// External boundaries
// ============================================================================

/// Source of stored tenant records (configuration database)
#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    /// Load the stored record for a tenant, `None` if unknown
    async fn load(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantToolConfig>, TenantStoreError>;
}

/// Decryption service for tenant secrets
#[async_trait]
pub trait SecretDecryptor: Send + Sync {
    async fn decrypt(
        &self,
        tenant_id: &TenantId,
        secret: &EncryptedSecret,
    ) -> Result<SecretValue, DecryptError>;
}

// ============================================================================
// Credential store
// ============================================================================

/// Resolves tenants to call-scoped credentials
///
/// Holds only handles to the external source and decryptor; no tenant data.
#[derive(Clone)]
pub struct TenantCredentialStore {
    source: Arc<dyn TenantConfigSource>,
    decryptor: Arc<dyn SecretDecryptor>,
}

impl TenantCredentialStore {
    pub fn new(source: Arc<dyn TenantConfigSource>, decryptor: Arc<dyn SecretDecryptor>) -> Self {
        Self { source, decryptor }
    }

    /// Check whether a tenant exists and is active
    ///
    /// Unknown tenants are reported as [`TenantError::NotFound`], never as
    /// `Ok(false)`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn is_active(&self, tenant_id: &TenantId) -> Result<bool, TenantError> {
        let record = self.load(tenant_id).await?;
        Ok(record.active)
    }

    /// Tool type configured for a tenant, without touching secrets
    pub async fn tool_type(&self, tenant_id: &TenantId) -> Result<ToolType, TenantError> {
        Ok(self.load(tenant_id).await?.tool_type)
    }

    /// Resolve a tenant to decrypted credentials
    ///
    /// Inactive tenants fail closed with [`TenantError::Inactive`].
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn resolve(&self, tenant_id: &TenantId) -> Result<TenantCredentials, TenantError> {
        let record = self.load(tenant_id).await?;

        if !record.active {
            warn!("Refusing to resolve credentials for inactive tenant");
            return Err(TenantError::Inactive {
                tenant_id: tenant_id.clone(),
            });
        }

        let api_token = self.decrypt(tenant_id, &record.api_credential).await?;
        let webhook_secret = self.decrypt(tenant_id, &record.webhook_secret).await?;

        debug!(tool_type = %record.tool_type, "Resolved tenant credentials");

        Ok(TenantCredentials {
            tenant_id: record.tenant_id,
            tool_type: record.tool_type,
            base_url: record.base_url,
            api_username: record.api_username,
            api_token,
            webhook_secret,
        })
    }

    async fn load(&self, tenant_id: &TenantId) -> Result<TenantToolConfig, TenantError> {
        let record = self
            .source
            .load(tenant_id)
            .await?
            .ok_or_else(|| TenantError::NotFound {
                tenant_id: tenant_id.clone(),
            })?;

        if &record.tenant_id != tenant_id {
            return Err(TenantStoreError::InvalidRecord {
                message: format!("record for '{}' returned for lookup", record.tenant_id),
            }
            .into());
        }

        Ok(record)
    }

    async fn decrypt(
        &self,
        tenant_id: &TenantId,
        secret: &EncryptedSecret,
    ) -> Result<SecretValue, TenantError> {
        self.decryptor
            .decrypt(tenant_id, secret)
            .await
            .map_err(|source| TenantError::Decryption {
                tenant_id: tenant_id.clone(),
                source,
            })
    }
}

impl fmt::Debug for TenantCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentialStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
