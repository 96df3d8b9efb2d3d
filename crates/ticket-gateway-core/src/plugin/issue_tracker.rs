//! Issue-tracker tool integration.
//!
//! Webhook payload:
//!
//! ```json
//! {
//!   "timestamp": 1709287200000,
//!   "webhookEvent": "issue_created",
//!   "tenant_id": "tenant-xyz",
//!   "issue": {
//!     "id": "10001",
//!     "key": "OPS-42",
//!     "fields": {
//!       "summary": "Deploy blocked",
//!       "description": { "type": "doc", "version": 1, "content": [] },
//!       "priority": { "name": "Highest" },
//!       "created": "2024-03-01T10:00:00.000+0000"
//!     }
//!   }
//! }
//! ```
//!
//! Descriptions may be plain strings or rich-text documents. Comments are
//! always posted as rich-text documents.

use super::rich_text::{to_document, to_plain_text};
use super::{
    required_str, resolve_json_path, tenant_from_payload, PluginError, TicketingToolPlugin,
};
use crate::api_client::{AuthHeader, ToolApiClient, ToolApiError, ToolRequest};
use crate::signature::verify_signature;
use crate::tenant::{TenantCredentialStore, TenantCredentials};
use crate::ticket::{Priority, Ticket, TicketMetadata};
use crate::{TenantId, Timestamp, ToolType, ValidationError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use url::Url;

/// Issue-tracker priority vocabulary
///
/// `Lowest` shares the canonical `low` level with `Low`.
pub const PRIORITY_TABLE: &[(&str, Priority)] = &[
    ("Highest", Priority::Critical),
    ("High", Priority::High),
    ("Medium", Priority::Medium),
    ("Low", Priority::Low),
    ("Lowest", Priority::Low),
];

const ISSUE_KEY_PATTERN: &str = r"^[A-Z][A-Z0-9_]*-[1-9][0-9]*$";

const READ_FIELDS: &str = "summary,description,priority,status,created,updated";

/// Plugin for the issue-tracker tool
pub struct IssueTrackerPlugin {
    credentials: TenantCredentialStore,
    client: ToolApiClient,
    issue_key: Regex,
}

impl IssueTrackerPlugin {
    pub const TENANT_FIELD: &'static str = "tenant_id";
    pub const SIGNATURE_HEADER: &'static str = "X-Hub-Signature";

    pub fn new(
        credentials: TenantCredentialStore,
        client: ToolApiClient,
    ) -> Result<Self, PluginError> {
        let issue_key = Regex::new(ISSUE_KEY_PATTERN).map_err(|e| PluginError::InvalidPlugin {
            tool_type: ToolType::IssueTracker,
            message: format!("issue key pattern: {}", e),
        })?;

        Ok(Self {
            credentials,
            client,
            issue_key,
        })
    }

    fn check_key(&self, field: &str, key: &str) -> Result<(), ValidationError> {
        if self.issue_key.is_match(key) {
            Ok(())
        } else {
            Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: format!("'{}' is not an issue key", key),
            })
        }
    }

    fn issue_url(base: &Url, key: &str, suffix: Option<&str>) -> Result<Url, PluginError> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PluginError::ToolApi(ToolApiError::Configuration {
                    message: format!("base URL '{}' cannot carry a path", base),
                })
            })?;
            segments
                .pop_if_empty()
                .extend(["rest", "api", "3", "issue", key]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    fn auth(credentials: &TenantCredentials) -> AuthHeader {
        match &credentials.api_username {
            Some(username) => AuthHeader::Basic {
                username: username.clone(),
                token: credentials.api_token.clone(),
            },
            None => AuthHeader::Bearer(credentials.api_token.clone()),
        }
    }
}

/// Comment request body carrying `content` as a rich-text document
pub fn comment_body(content: &str) -> Value {
    json!({ "body": to_document(content) })
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    key: String,
    fields: ApiFields,
}

#[derive(Debug, Deserialize)]
struct ApiFields {
    summary: String,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default)]
    priority: Option<NamedField>,
    #[serde(default)]
    status: Option<NamedField>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: String,
}

impl ApiIssue {
    fn into_ticket(self) -> Ticket {
        let fields = self.fields;
        Ticket {
            id: self.key,
            summary: fields.summary,
            description: fields
                .description
                .filter(|d| !d.is_null())
                .map(|d| to_plain_text(&d)),
            status: fields.status.map(|s| s.name),
            priority: fields.priority.map(|p| p.name),
            created_at: fields
                .created
                .and_then(|s| Timestamp::from_iso8601_compact(&s).ok()),
            updated_at: fields
                .updated
                .and_then(|s| Timestamp::from_iso8601_compact(&s).ok()),
        }
    }
}

fn description_text(payload: &Value) -> Result<Option<String>, ValidationError> {
    const FIELD: &str = "issue.fields.description";
    match resolve_json_path(payload, FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(doc @ Value::Object(_)) => Ok(Some(to_plain_text(doc))),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: FIELD.to_string(),
            message: "expected a string, a document or null".to_string(),
        }),
    }
}

#[async_trait]
impl TicketingToolPlugin for IssueTrackerPlugin {
    fn tool_type(&self) -> ToolType {
        ToolType::IssueTracker
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
        let invalid = |message: String| ValidationError::InvalidFormat {
            field: "timestamp".to_string(),
            message,
        };

        let millis = match payload.get("timestamp") {
            None | Some(Value::Null) => {
                return Err(ValidationError::Required {
                    field: "timestamp".to_string(),
                })
            }
            Some(value) => value
                .as_i64()
                .ok_or_else(|| invalid("expected epoch milliseconds".to_string()))?,
        };

        Timestamp::from_epoch_millis(millis).map_err(|e| invalid(e.to_string()))
    }

    fn extract_metadata(&self, payload: &Value) -> Result<TicketMetadata, ValidationError> {
        let tenant_id = tenant_from_payload(payload, Self::TENANT_FIELD)?;

        let key = required_str(payload, "issue.key")?;
        self.check_key("issue.key", key)?;

        let summary = required_str(payload, "issue.fields.summary")?;
        let description = description_text(payload)?;

        let priority_label = required_str(payload, "issue.fields.priority.name")?;
        let priority =
            Priority::from_vendor(PRIORITY_TABLE, "issue.fields.priority.name", priority_label)?;

        let created_raw = required_str(payload, "issue.fields.created")?;
        let created_at = Timestamp::from_iso8601_compact(created_raw).map_err(|e| {
            ValidationError::InvalidFormat {
                field: "issue.fields.created".to_string(),
                message: e.to_string(),
            }
        })?;

        let event_at = self.event_timestamp(payload)?;

        TicketMetadata::new(
            tenant_id,
            key,
            summary,
            description,
            priority,
            created_at,
            event_at,
            ToolType::IssueTracker,
        )
    }

    #[instrument(skip(self), fields(tool_type = "issue-tracker"))]
    async fn get_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
    ) -> Result<Option<Ticket>, PluginError> {
        self.check_key("ticket_id", ticket_id)?;

        let credentials = self.credentials.resolve(tenant_id).await?;
        let mut url = Self::issue_url(&credentials.base_url, ticket_id, None)?;
        url.query_pairs_mut().append_pair("fields", READ_FIELDS);
        let request = ToolRequest::get(url, Self::auth(&credentials));
        drop(credentials);

        match self.client.execute(&request).await {
            Ok(response) => {
                let issue: ApiIssue = response.json()?;
                Ok(Some(issue.into_ticket()))
            }
            Err(ToolApiError::NotFound) => {
                info!("Issue not found");
                Ok(None)
            }
            Err(e @ ToolApiError::Unauthorized { .. }) => {
                error!(status = ?e.status(), "Tool rejected tenant credentials while reading issue");
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Failed to read issue");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, content), fields(tool_type = "issue-tracker", content_len = content.len()))]
    async fn update_ticket(
        &self,
        tenant_id: &TenantId,
        ticket_id: &str,
        content: &str,
    ) -> Result<bool, PluginError> {
        self.check_key("ticket_id", ticket_id)?;

        let credentials = self.credentials.resolve(tenant_id).await?;
        let url = Self::issue_url(&credentials.base_url, ticket_id, Some("comment"))?;
        let request = ToolRequest::post(url, Self::auth(&credentials), comment_body(content));
        drop(credentials);

        match self.client.execute(&request).await {
            Ok(_) => {
                info!("Comment added to issue");
                Ok(true)
            }
            Err(e @ ToolApiError::Unauthorized { .. }) => {
                error!(status = ?e.status(), "Tool rejected tenant credentials while commenting");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Failed to comment on issue");
                Ok(false)
            }
        }
    }

    fn close(&self) {
        self.client.close();
    }
}

#[cfg(test)]
#[path = "issue_tracker_tests.rs"]
mod tests;
