//! # In-Memory Tenant Source
//!
//! Thread-safe in-memory [`TenantConfigSource`] for development and testing.
//! Can be populated from a YAML tenant directory:
//!
//! ```yaml
//! tenants:
//!   - tenant_id: tenant-abc
//!     tool_type: helpdesk
//!     base_url: https://abc.helpdesk.example
//!     api_credential: dG9rZW4=
//!     webhook_secret: c2VjcmV0
//!     active: true
//! ```

use crate::tenant::{TenantConfigSource, TenantStoreError, TenantToolConfig};
use crate::TenantId;
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::info;

#[derive(Debug, Deserialize)]
struct TenantDirectory {
    #[serde(default)]
    tenants: Vec<TenantToolConfig>,
}

/// In-memory tenant records keyed by tenant id
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantSource {
    tenants: Arc<RwLock<HashMap<TenantId, TenantToolConfig>>>,
}

impl InMemoryTenantSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-populated with records
    pub fn with_tenants(records: impl IntoIterator<Item = TenantToolConfig>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.tenant_id.clone(), record))
            .collect();
        Self {
            tenants: Arc::new(RwLock::new(map)),
        }
    }

    /// Parse a YAML tenant directory
    ///
    /// Duplicate tenant ids are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TenantStoreError> {
        let directory: TenantDirectory =
            serde_yaml::from_str(yaml).map_err(|e| TenantStoreError::InvalidRecord {
                message: e.to_string(),
            })?;

        let mut map = HashMap::with_capacity(directory.tenants.len());
        for record in directory.tenants {
            let tenant_id = record.tenant_id.clone();
            if map.insert(tenant_id.clone(), record).is_some() {
                return Err(TenantStoreError::InvalidRecord {
                    message: format!("duplicate tenant '{}'", tenant_id),
                });
            }
        }

        info!(tenant_count = map.len(), "Loaded tenant directory");

        Ok(Self {
            tenants: Arc::new(RwLock::new(map)),
        })
    }

    /// Read and parse a YAML tenant directory file
    pub fn from_yaml_file(path: &Path) -> Result<Self, TenantStoreError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| TenantStoreError::Unavailable {
                message: format!("failed to read {}: {}", path.display(), e),
            })?;
        Self::from_yaml_str(&contents)
    }

    /// Insert or replace a record
    pub fn upsert(&self, record: TenantToolConfig) -> Result<(), TenantStoreError> {
        let mut tenants = self.tenants.write().map_err(|_| lock_poisoned())?;
        tenants.insert(record.tenant_id.clone(), record);
        Ok(())
    }

    /// Flip a tenant's active flag; returns false for unknown tenants
    pub fn set_active(&self, tenant_id: &TenantId, active: bool) -> Result<bool, TenantStoreError> {
        let mut tenants = self.tenants.write().map_err(|_| lock_poisoned())?;
        Ok(match tenants.get_mut(tenant_id) {
            Some(record) => {
                record.active = active;
                true
            }
            None => false,
        })
    }

    pub fn len(&self) -> usize {
        self.tenants.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_poisoned() -> TenantStoreError {
    TenantStoreError::Unavailable {
        message: "tenant map lock poisoned".to_string(),
    }
}

#[async_trait]
impl TenantConfigSource for InMemoryTenantSource {
    async fn load(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantToolConfig>, TenantStoreError> {
        let tenants = self.tenants.read().map_err(|_| lock_poisoned())?;
        Ok(tenants.get(tenant_id).cloned())
    }
}

#[cfg(test)]
#[path = "memory_tenant_source_tests.rs"]
mod tests;
