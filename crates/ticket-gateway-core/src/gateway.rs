//! # Webhook Gateway
//!
//! Authenticates and normalizes inbound webhooks, then hands them to the
//! dispatcher. The stages run in a fixed order:
//!
//! 1. Read the tenant identifier from the payload at the route tool's field path.
//! 2. Resolve the tenant with a single store read. Unknown or inactive
//!    tenants fail before anything is decrypted or hashed.
//! 3. Look up the plugin for the tenant's configured tool. From here until
//!    the enqueue, all work is in memory.
//! 4. Validate the signature with the tenant's webhook secret.
//! 5. Reject events outside the replay window.
//! 6. Extract canonical metadata.
//! 7. Enqueue and acknowledge.
//!
//! Security-relevant outcomes are logged under the `audit` target with tenant
//! context. Secrets and signature values are never logged.

use crate::dispatch::{DispatchError, EnqueueDispatcher};
use crate::plugin::{parse_payload, tenant_from_payload, PluginManager};
use crate::signature::ReplayWindow;
use crate::tenant::{TenantCredentialStore, TenantError};
use crate::{ErrorCategory, JobId, TenantId, Timestamp, ToolType, ValidationError};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Core Types
// ============================================================================

/// Raw inbound webhook request
#[derive(Debug, Clone, Default)]
pub struct InboundWebhook {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl InboundWebhook {
    /// Build from header pairs and the raw body
    ///
    /// Header names are stored lowercase.
    pub fn new<I, K, V>(headers: I, body: impl Into<Bytes>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body: body.into(),
        }
    }

    /// Header value, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Acknowledgement for an accepted webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub tool_type: ToolType,
}

// ============================================================================
// Error Types
// ============================================================================

/// Gateway rejection reasons
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Unknown tool type '{tool_type}'")]
    UnknownTool { tool_type: String },

    #[error("Authentication failed")]
    Authentication {
        tenant_id: Option<TenantId>,
        reason: String,
    },

    #[error("Tenant '{tenant_id}' is inactive")]
    TenantInactive { tenant_id: TenantId },

    #[error("Payload validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Gateway misconfigured: {message}")]
    Configuration { message: String },

    #[error("Tenant configuration unavailable: {message}")]
    TenantStoreUnavailable { message: String },

    #[error("Failed to enqueue: {0}")]
    Dispatch(#[from] DispatchError),
}

impl GatewayError {
    /// HTTP status code for this rejection
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownTool { .. } => 404,
            Self::Authentication { .. } => 401,
            Self::TenantInactive { .. } => 403,
            Self::Validation(_) => 422,
            Self::Configuration { .. } => 500,
            Self::TenantStoreUnavailable { .. } | Self::Dispatch(_) => 503,
        }
    }

    /// Check if error is transient and the sender should retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TenantStoreUnavailable { .. } => true,
            Self::Dispatch(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Authentication { .. } | Self::TenantInactive { .. } => ErrorCategory::Security,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Validation(_) | Self::UnknownTool { .. } => ErrorCategory::Permanent,
            Self::TenantStoreUnavailable { .. } => ErrorCategory::Transient,
            Self::Dispatch(e) => e.error_category(),
        }
    }

    fn authentication(tenant_id: Option<&TenantId>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            tenant_id: tenant_id.cloned(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Inbound webhook pipeline
#[derive(Clone)]
pub struct WebhookGateway {
    plugins: Arc<PluginManager>,
    tenants: TenantCredentialStore,
    dispatcher: Arc<dyn EnqueueDispatcher>,
    replay: ReplayWindow,
}

impl WebhookGateway {
    pub fn new(
        plugins: Arc<PluginManager>,
        tenants: TenantCredentialStore,
        dispatcher: Arc<dyn EnqueueDispatcher>,
        replay: ReplayWindow,
    ) -> Self {
        Self {
            plugins,
            tenants,
            dispatcher,
            replay,
        }
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn replay_window(&self) -> ReplayWindow {
        self.replay
    }

    /// Run the acceptance pipeline for a webhook posted to `route_tool`
    #[instrument(skip(self, webhook), fields(route_tool = %route_tool, body_len = webhook.body().len()))]
    pub async fn accept(
        &self,
        route_tool: &str,
        webhook: InboundWebhook,
    ) -> Result<Accepted, GatewayError> {
        self.accept_at(route_tool, webhook, Timestamp::now()).await
    }

    /// [`accept`](Self::accept) with an explicit clock reading for the replay check
    pub async fn accept_at(
        &self,
        route_tool: &str,
        webhook: InboundWebhook,
        now: Timestamp,
    ) -> Result<Accepted, GatewayError> {
        let route_plugin =
            self.plugins
                .get_by_name(route_tool)
                .map_err(|_| GatewayError::UnknownTool {
                    tool_type: route_tool.to_string(),
                })?;
        let route_type = route_plugin.tool_type();

        // Tenant identity comes from an untrusted body; failures here are
        // authentication failures, not validation failures.
        let payload = parse_payload(webhook.body()).map_err(|e| {
            warn!(target: "audit", tool_type = %route_type, error = %e, "Rejected unparsable webhook body");
            GatewayError::authentication(None, "payload is not valid JSON")
        })?;
        let tenant_id =
            tenant_from_payload(&payload, route_plugin.tenant_field_path()).map_err(|e| {
                warn!(target: "audit", tool_type = %route_type, error = %e, "Rejected webhook without tenant identifier");
                GatewayError::authentication(None, "tenant identifier missing or invalid")
            })?;

        let credentials = self
            .tenants
            .resolve(&tenant_id)
            .await
            .map_err(|e| self.tenant_failure(&tenant_id, route_type, e))?;

        let configured_type = credentials.tool_type;
        let plugin = self.plugins.get(configured_type).map_err(|e| {
            error!(
                severity = "critical",
                tenant_id = %tenant_id,
                tool_type = %configured_type,
                error = %e,
                "No plugin registered for tenant's configured tool"
            );
            GatewayError::Configuration {
                message: e.to_string(),
            }
        })?;

        if configured_type != route_type {
            warn!(
                target: "audit",
                tenant_id = %tenant_id,
                route_tool = %route_type,
                configured_tool = %configured_type,
                "Rejected webhook routed to a tool the tenant does not use"
            );
            return Err(GatewayError::authentication(
                Some(&tenant_id),
                "tool type does not match tenant configuration",
            ));
        }

        let signature = webhook.header(plugin.signature_header());
        let verdict = plugin.validate_webhook(webhook.body(), signature, &credentials);
        drop(credentials);

        match verdict {
            Ok(true) => {}
            Ok(false) => {
                warn!(target: "audit", tenant_id = %tenant_id, tool_type = %configured_type, "Webhook signature mismatch");
                return Err(GatewayError::authentication(
                    Some(&tenant_id),
                    "signature mismatch",
                ));
            }
            Err(e) => {
                warn!(target: "audit", tenant_id = %tenant_id, tool_type = %configured_type, error = %e, "Webhook signature unusable");
                return Err(GatewayError::authentication(
                    Some(&tenant_id),
                    e.to_string(),
                ));
            }
        }

        if self.replay.is_enabled() {
            let event_at = plugin.event_timestamp(&payload).map_err(|e| {
                warn!(target: "audit", tenant_id = %tenant_id, error = %e, "Webhook event time unreadable");
                GatewayError::authentication(Some(&tenant_id), "event timestamp missing or invalid")
            })?;
            if let Err(rejection) = self.replay.check(event_at, now) {
                warn!(target: "audit", tenant_id = %tenant_id, tool_type = %configured_type, reason = %rejection, "Webhook outside replay window");
                return Err(GatewayError::authentication(
                    Some(&tenant_id),
                    rejection.to_string(),
                ));
            }
        }

        let metadata = plugin.extract_metadata(&payload).map_err(|e| {
            warn!(tenant_id = %tenant_id, tool_type = %configured_type, error = %e, "Webhook payload failed validation");
            GatewayError::Validation(e)
        })?;

        if metadata.tenant_id() != &tenant_id {
            warn!(target: "audit", tenant_id = %tenant_id, "Extracted tenant differs from routed tenant");
            return Err(GatewayError::authentication(
                Some(&tenant_id),
                "tenant identifier mismatch",
            ));
        }

        let job_id = self.dispatcher.enqueue(metadata).await.map_err(|e| {
            warn!(tenant_id = %tenant_id, error = %e, transient = e.is_transient(), "Failed to enqueue webhook");
            GatewayError::Dispatch(e)
        })?;

        info!(target: "audit", tenant_id = %tenant_id, tool_type = %configured_type, job_id = %job_id, "Webhook accepted");

        Ok(Accepted {
            job_id,
            tenant_id,
            tool_type: configured_type,
        })
    }

    fn tenant_failure(
        &self,
        tenant_id: &TenantId,
        tool_type: ToolType,
        e: TenantError,
    ) -> GatewayError {
        if e.is_transient() {
            warn!(tenant_id = %tenant_id, error = %e, "Tenant configuration temporarily unavailable");
            return GatewayError::TenantStoreUnavailable {
                message: e.to_string(),
            };
        }

        match e {
            TenantError::Inactive { tenant_id } => {
                warn!(target: "audit", tenant_id = %tenant_id, tool_type = %tool_type, "Rejected webhook for inactive tenant");
                GatewayError::TenantInactive { tenant_id }
            }
            TenantError::NotFound { .. } => {
                warn!(target: "audit", tenant_id = %tenant_id, tool_type = %tool_type, "Rejected webhook for unknown tenant");
                GatewayError::authentication(Some(tenant_id), "tenant not found")
            }
            TenantError::Decryption { .. } => {
                error!(target: "audit", tenant_id = %tenant_id, tool_type = %tool_type, error = %e, "Tenant credentials could not be decrypted");
                GatewayError::authentication(Some(tenant_id), "tenant credentials unavailable")
            }
            TenantError::Store(store) => {
                error!(tenant_id = %tenant_id, error = %store, "Tenant record invalid");
                GatewayError::Configuration {
                    message: store.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for WebhookGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookGateway")
            .field("plugins", &self.plugins)
            .field("replay", &self.replay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
