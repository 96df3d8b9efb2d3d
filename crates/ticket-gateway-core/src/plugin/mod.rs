//! # Ticketing Tool Plugins
//!
//! The contract every tool integration implements, and the registry that maps
//! tool types to plugin instances.
//!
//! A plugin instance serves every tenant configured for its tool type. It
//! holds only shared handles (credential store, API client); tenant identity
//! arrives as call arguments.
//!
//! The registry is populated once at startup through [`PluginRegistryBuilder`]
//! and frozen into a [`PluginManager`], which offers no mutation.

use crate::api_client::ToolApiError;
use crate::signature::SignatureError;
use crate::tenant::{TenantCredentials, TenantError};
use crate::ticket::{Ticket, TicketMetadata};
use crate::{ErrorCategory, TenantId, Timestamp, ToolType, ValidationError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

pub mod helpdesk;
pub mod issue_tracker;
pub mod rich_text;

pub use helpdesk::HelpDeskPlugin;
pub use issue_tracker::IssueTrackerPlugin;

// ============================================================================
// Errors
// ============================================================================

/// Plugin and registry errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tenant error: {0}")]
    Tenant(#[from] TenantError),

    #[error("Tool API error: {0}")]
    ToolApi(#[from] ToolApiError),

    #[error("No plugin registered for tool type '{tool_type}'")]
    PluginNotFound { tool_type: String },

    #[error("A plugin is already registered for tool type '{tool_type}'")]
    DuplicateRegistration { tool_type: ToolType },

    #[error("Plugin declares tool type '{declared}' but was registered as '{registered}'")]
    ToolTypeMismatch {
        registered: ToolType,
        declared: ToolType,
    },

    #[error("Plugin for '{tool_type}' is invalid: {message}")]
    InvalidPlugin { tool_type: ToolType, message: String },

    #[error("Plugin registry has already been initialized")]
    RegistryFrozen,
}

impl PluginError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Tenant(e) => e.is_transient(),
            Self::ToolApi(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Signature(_) => ErrorCategory::Security,
            Self::Validation(_) => ErrorCategory::Permanent,
            Self::Tenant(e) => e.error_category(),
            Self::ToolApi(e) if e.is_transient() => ErrorCategory::Transient,
            Self::ToolApi(_) => ErrorCategory::Permanent,
            Self::PluginNotFound { .. }
            | Self::DuplicateRegistration { .. }
            | Self::ToolTypeMismatch { .. }
            | Self::InvalidPlugin { .. }
            | Self::RegistryFrozen => ErrorCategory::Configuration,
        }
    }
}

// ============================================================================
// Plugin contract
// ============================================================================

/// Interface implemented by every ticketing-tool integration
///
/// All methods are required. An implementation that leaves any of them out
/// does not compile, so an incomplete plugin can never reach the registry:
///
/// ```compile_fail
/// use ticket_gateway_core::plugin::TicketingToolPlugin;
///
/// struct Incomplete;
///
/// impl TicketingToolPlugin for Incomplete {}
/// ```
#[async_trait]
pub trait TicketingToolPlugin: Send + Sync {
    /// Tool type this plugin handles
    fn tool_type(&self) -> ToolType;

    /// Dotted path of the tenant identifier in the webhook payload
    fn tenant_field_path(&self) -> &'static str;

    /// Name of the HTTP header carrying the webhook signature
    fn signature_header(&self) -> &'static str;

    /// Validate the webhook signature over the exact raw body
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature and an error
    /// for a missing or malformed header.
    fn validate_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
        credentials: &TenantCredentials,
    ) -> Result<bool, PluginError>;

    /// Time the tool emitted the event, used for replay protection
    fn event_timestamp(&self, payload: &Value) -> Result<Timestamp, ValidationError>;

    /// Map a tool payload onto canonical metadata
    fn extract_metadata(&self, payload: &Value) -> Result<TicketMetadata, ValidationError>;

    /// Read a ticket; `Ok(None)` when the tool reports it does not exist
    async fn get_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
    ) -> Result<Option<Ticket>, PluginError>;

    /// Add `content` to a ticket as a comment
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the tool rejects the
    /// write or stays unreachable after retries.
    async fn update_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
        content: &str,
    ) -> Result<bool, PluginError>;

    /// Release the plugin's API client
    fn close(&self);
}

// ============================================================================
// Registry
// ============================================================================

static GLOBAL_MANAGER: OnceLock<PluginManager> = OnceLock::new();

/// Startup-time builder for the plugin registry
#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: HashMap<ToolType, Arc<dyn TicketingToolPlugin>>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin for a tool type
    ///
    /// Rejects a second registration for the same tool type, a plugin that
    /// declares a different tool type, and a plugin with an empty tenant
    /// field path or signature header.
    pub fn register(
        &mut self,
        tool_type: ToolType,
        plugin: Arc<dyn TicketingToolPlugin>,
    ) -> Result<&mut Self, PluginError> {
        if self.plugins.contains_key(&tool_type) {
            return Err(PluginError::DuplicateRegistration { tool_type });
        }

        let declared = plugin.tool_type();
        if declared != tool_type {
            return Err(PluginError::ToolTypeMismatch {
                registered: tool_type,
                declared,
            });
        }

        if plugin.tenant_field_path().trim().is_empty() {
            return Err(PluginError::InvalidPlugin {
                tool_type,
                message: "tenant field path is empty".to_string(),
            });
        }

        if plugin.signature_header().trim().is_empty() {
            return Err(PluginError::InvalidPlugin {
                tool_type,
                message: "signature header name is empty".to_string(),
            });
        }

        info!(tool_type = %tool_type, "Registered ticketing tool plugin");
        self.plugins.insert(tool_type, plugin);
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> PluginManager {
        PluginManager {
            plugins: self.plugins,
        }
    }
}

/// Immutable map from tool type to plugin
///
/// Reads need no locking because nothing can mutate the map after
/// [`PluginRegistryBuilder::build`].
#[derive(Clone)]
pub struct PluginManager {
    plugins: HashMap<ToolType, Arc<dyn TicketingToolPlugin>>,
}

impl PluginManager {
    /// Look up the plugin for a tool type
    pub fn get(&self, tool_type: ToolType) -> Result<Arc<dyn TicketingToolPlugin>, PluginError> {
        self.plugins
            .get(&tool_type)
            .cloned()
            .ok_or_else(|| PluginError::PluginNotFound {
                tool_type: tool_type.to_string(),
            })
    }

    /// Look up the plugin for a tool type given by its string identifier
    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn TicketingToolPlugin>, PluginError> {
        let tool_type: ToolType = name.parse().map_err(|_| PluginError::PluginNotFound {
            tool_type: name.to_string(),
        })?;
        self.get(tool_type)
    }

    pub fn contains(&self, tool_type: ToolType) -> bool {
        self.plugins.contains_key(&tool_type)
    }

    /// Registered tool types, ordered by identifier
    pub fn tool_types(&self) -> Vec<ToolType> {
        let mut types: Vec<ToolType> = self.plugins.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Close every plugin's API client
    pub fn close_all(&self) {
        for (tool_type, plugin) in &self.plugins {
            plugin.close();
            info!(tool_type = %tool_type, "Closed plugin");
        }
    }

    /// Install this manager as the process-wide registry
    ///
    /// Succeeds once per process.
    pub fn install_global(self) -> Result<&'static PluginManager, PluginError> {
        GLOBAL_MANAGER
            .set(self)
            .map_err(|_| PluginError::RegistryFrozen)?;
        GLOBAL_MANAGER.get().ok_or(PluginError::RegistryFrozen)
    }

    /// The process-wide registry, if installed
    pub fn global() -> Option<&'static PluginManager> {
        GLOBAL_MANAGER.get()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("tool_types", &self.tool_types())
            .finish()
    }
}

// ============================================================================
// Payload helpers
// ============================================================================

/// Parse a raw webhook body as JSON
pub fn parse_payload(raw_body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(raw_body).map_err(|e| ValidationError::MalformedPayload {
        message: e.to_string(),
    })
}

/// Resolve a dot-separated path (e.g. `"account.tenant_id"`) in a JSON value
pub fn resolve_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Required non-empty string at `path`
pub fn required_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, ValidationError> {
    match resolve_json_path(value, path) {
        None | Some(Value::Null) => Err(ValidationError::Required {
            field: path.to_string(),
        }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(ValidationError::Required {
            field: path.to_string(),
        }),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: path.to_string(),
            message: "expected a string".to_string(),
        }),
    }
}

/// Optional string at `path`; null and blank strings are `None`
pub fn optional_str<'a>(value: &'a Value, path: &str) -> Result<Option<&'a str>, ValidationError> {
    match resolve_json_path(value, path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: path.to_string(),
            message: "expected a string or null".to_string(),
        }),
    }
}

/// Required identifier at `path`, given as a non-empty string or an unsigned integer
pub fn required_id(value: &Value, path: &str) -> Result<String, ValidationError> {
    match resolve_json_path(value, path) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|id| id.to_string())
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: path.to_string(),
                message: "expected an unsigned integer".to_string(),
            }),
        _ => required_str(value, path).map(str::to_string),
    }
}

/// Tenant identifier at `path`
pub fn tenant_from_payload(value: &Value, path: &str) -> Result<TenantId, ValidationError> {
    let raw = required_str(value, path)?;
    TenantId::new(raw)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
