//! Help-desk tool integration.
//!
//! Webhook payload:
//!
//! ```json
//! {
//!   "account": { "tenant_id": "tenant-abc" },
//!   "event": { "type": "ticket.created", "occurred_at": "2024-03-01T10:15:00+02:00" },
//!   "ticket": {
//!     "id": 4711,
//!     "subject": "Printer on fire",
//!     "description": "Third floor",
//!     "priority": "urgent",
//!     "created_at": "2024-03-01T10:14:03+02:00"
//!   }
//! }
//! ```
//!
//! Comments are posted as plain text with bearer-token authentication.

use super::{
    optional_str, required_id, required_str, tenant_from_payload, PluginError,
    TicketingToolPlugin,
};
use crate::api_client::{AuthHeader, ToolApiClient, ToolApiError, ToolRequest};
use crate::signature::verify_signature;
use crate::tenant::{TenantCredentialStore, TenantCredentials};
use crate::ticket::{Priority, Ticket, TicketMetadata};
use crate::{TenantId, Timestamp, ToolType, ValidationError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use url::Url;

/// Help-desk priority vocabulary
///
/// | help-desk | canonical |
/// |-----------|-----------|
/// | low       | low       |
/// | normal    | medium    |
/// | high      | high      |
/// | urgent    | critical  |
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("low", Priority::Low),
    ("normal", Priority::Medium),
    ("high", Priority::High),
    ("urgent", Priority::Critical),
];

/// Plugin for the help-desk tool
pub struct HelpDeskPlugin {
    credentials: TenantCredentialStore,
    client: ToolApiClient,
}

impl HelpDeskPlugin {
    pub const TENANT_FIELD: &'static str = "account.tenant_id";
    pub const SIGNATURE_HEADER: &'static str = "X-HelpDesk-Signature";

    pub fn new(credentials: TenantCredentialStore, client: ToolApiClient) -> Self {
        Self {
            credentials,
            client,
        }
    }

    fn ticket_url(base: &Url, ticket_id: &str) -> Result<Url, PluginError> {
        let file = format!("{}.json", ticket_id);
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PluginError::ToolApi(ToolApiError::Configuration {
                    message: format!("base URL '{}' cannot carry a path", base),
                })
            })?
            .pop_if_empty()
            .extend(["api", "v2", "tickets", file.as_str()]);
        Ok(url)
    }

    fn auth(credentials: &TenantCredentials) -> AuthHeader {
        AuthHeader::Bearer(credentials.api_token.clone())
    }
}

/// Comment body for a ticket update
///
/// Line endings are normalized to `\n` and trailing whitespace is removed.
/// Comments are internal notes.
pub fn plain_text_comment(content: &str) -> Value {
    let body = content.replace("\r\n", "\n").replace('\r', "\n");
    json!({
        "ticket": {
            "comment": {
                "body": body.trim_end(),
                "public": false,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct TicketEnvelope {
    ticket: ApiTicket,
}

#[derive(Debug, Deserialize)]
struct ApiTicket {
    id: Value,
    subject: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl ApiTicket {
    fn into_ticket(self) -> Ticket {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ticket {
            id,
            summary: self.subject,
            description: self.description,
            status: self.status,
            priority: self.priority,
            created_at: self
                .created_at
                .and_then(|s| Timestamp::from_rfc3339(&s).ok()),
            updated_at: self
                .updated_at
                .and_then(|s| Timestamp::from_rfc3339(&s).ok()),
        }
    }
}

#[async_trait]
impl TicketingToolPlugin for HelpDeskPlugin {
    fn tool_type(&self) -> ToolType {
        ToolType::HelpDesk
    }

    fn tenant_field_path(&self) -> &'static str {
        Self::TENANT_FIELD
    }

    fn signature_header(&self) -> &'static str {
        Self::SIGNATURE_HEADER
    }

    fn validate_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
        credentials: &TenantCredentials,
    ) -> Result<bool, PluginError> {
        Ok(verify_signature(
            credentials.webhook_secret.expose_secret(),
            raw_body,
            signature_header,
            Self::SIGNATURE_HEADER,
        )?)
    }

    fn event_timestamp(&self, payload: &Value) -> Result<Timestamp, ValidationError> {
        let raw = required_str(payload, "event.occurred_at")?;
        Timestamp::from_rfc3339(raw).map_err(|e| ValidationError::InvalidFormat {
            field: "event.occurred_at".to_string(),
            message: e.to_string(),
        })
    }

    fn extract_metadata(&self, payload: &Value) -> Result<TicketMetadata, ValidationError> {
        let tenant_id = tenant_from_payload(payload, Self::TENANT_FIELD)?;
        let ticket_id = required_id(payload, "ticket.id")?;
        let summary = required_str(payload, "ticket.subject")?;
        let description = optional_str(payload, "ticket.description")?;

        let priority_label = required_str(payload, "ticket.priority")?;
        let priority = Priority::from_vendor(PRIORITY_TABLE, "ticket.priority", priority_label)?;

        let created_raw = required_str(payload, "ticket.created_at")?;
        let created_at =
            Timestamp::from_rfc3339(created_raw).map_err(|e| ValidationError::InvalidFormat {
                field: "ticket.created_at".to_string(),
                message: e.to_string(),
            })?;

        let event_at = self.event_timestamp(payload)?;

        TicketMetadata::new(
            tenant_id,
            ticket_id,
            summary,
            description.map(str::to_string),
            priority,
            created_at,
            event_at,
            ToolType::HelpDesk,
        )
    }

    #[instrument(skip(self), fields(tool_type = "helpdesk"))]
    async fn get_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
    ) -> Result<Option<Ticket>, PluginError> {
        let credentials = self.credentials.resolve(tenant_id).await?;
        let url = Self::ticket_url(&credentials.base_url, ticket_id)?;
        let request = ToolRequest::get(url, Self::auth(&credentials));
        drop(credentials);

        match self.client.execute(&request).await {
            Ok(response) => {
                let envelope: TicketEnvelope = response.json()?;
                Ok(Some(envelope.ticket.into_ticket()))
            }
            Err(ToolApiError::NotFound) => {
                info!("Ticket not found");
                Ok(None)
            }
            Err(e @ ToolApiError::Unauthorized { .. }) => {
                error!(status = ?e.status(), "Tool rejected tenant credentials while reading ticket");
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Failed to read ticket");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, content), fields(tool_type = "helpdesk", content_len = content.len()))]
    async fn update_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
        content: &str,
    ) -> Result<bool, PluginError> {
        let credentials = self.credentials.resolve(tenant_id).await?;
        let url = Self::ticket_url(&credentials.base_url, ticket_id)?;
        let request = ToolRequest::put(url, Self::auth(&credentials), plain_text_comment(content));
        drop(credentials);

        match self.client.execute(&request).await {
            Ok(_) => {
                info!("Ticket updated");
                Ok(true)
            }
            Err(e @ ToolApiError::Unauthorized { .. }) => {
                error!(status = ?e.status(), "Tool rejected tenant credentials while updating ticket");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Failed to update ticket");
                Ok(false)
            }
        }
    }

    fn close(&self) {
        self.client.close();
    }
}

#[cfg(test)]
#[path = "helpdesk_tests.rs"]
mod tests;
