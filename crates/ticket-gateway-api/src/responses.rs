//! Response bodies for the HTTP endpoints.

use serde::Serialize;
use ticket_gateway_core::{Accepted, JobId, TenantId, Timestamp, ToolType};

/// Acknowledgement for an accepted webhook
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub job_id: JobId,
    pub status: String,
    pub tenant_id: TenantId,
    pub tool_type: ToolType,
}

impl From<Accepted> for WebhookResponse {
    fn from(accepted: Accepted) -> Self {
        Self {
            job_id: accepted.job_id,
            status: "accepted".to_string(),
            tenant_id: accepted.tenant_id,
            tool_type: accepted.tool_type,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub tool_types: Vec<ToolType>,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: Timestamp,
}
