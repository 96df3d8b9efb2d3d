//! Canonical ticket model.
//!
//! Every plugin maps its vendor payload onto [`TicketMetadata`]. The type can
//! only be built through [`TicketMetadata::new`], which either returns a fully
//! populated record or a [`ValidationError`].

use crate::{TenantId, Timestamp, ToolType, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical four-level priority scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Look up a vendor priority label in a tool's mapping table
    ///
    /// Matching ignores ASCII case and surrounding whitespace. A label that is
    /// not in the table is an error; there is no fallback level.
    pub fn from_vendor(
        table: &[(&str, Priority)],
        field: &str,
        label: &str,
    ) -> Result<Self, ValidationError> {
        let label = label.trim();
        table
            .iter()
            .find(|(vendor, _)| vendor.eq_ignore_ascii_case(label))
            .map(|(_, priority)| *priority)
            .ok_or_else(|| ValidationError::UnmappedValue {
                field: field.to_string(),
                value: label.to_string(),
            })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool-agnostic ticket record produced from a webhook
///
/// Identity for downstream deduplication is `(tenant_id, ticket_id, event_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMetadata {
    tenant_id: TenantId,
    ticket_id: String,
    summary: String,
    description: String,
    priority: Priority,
    created_at: Timestamp,
    event_at: Timestamp,
    tool_type: ToolType,
}

impl TicketMetadata {
    /// Build a metadata record
    ///
    /// `description` falls back to `summary` when absent or blank. An empty
    /// ticket id or summary is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        ticket_id: impl Into<String>,
        summary: impl Into<String>,
        description: Option<String>,
        priority: Priority,
        created_at: Timestamp,
        event_at: Timestamp,
        tool_type: ToolType,
    ) -> Result<Self, ValidationError> {
        let ticket_id = ticket_id.into();
        if ticket_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "ticket_id".to_string(),
            });
        }

        let summary = summary.into();
        if summary.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "summary".to_string(),
            });
        }

        let description = match description {
            Some(text) if !text.trim().is_empty() => text,
            _ => summary.clone(),
        };

        Ok(Self {
            tenant_id,
            ticket_id,
            summary,
            description,
            priority,
            created_at,
            event_at,
            tool_type,
        })
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// External ticket identifier, opaque to this layer
    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// When the ticket was created in the source tool (UTC)
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// When the source tool emitted the webhook event (UTC)
    pub fn event_at(&self) -> Timestamp {
        self.event_at
    }

    pub fn tool_type(&self) -> ToolType {
        self.tool_type
    }
}

/// Ticket as read back from a tool's API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
