//! Common test utilities for ticket gateway integration tests
//!
//! Builds the full intake stack (tenant store, real plugins, channel queue,
//! gateway, router) against a configurable tool base URL.

use axum::{body::Body, http::Request, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_gateway_api::{create_router, AppState, ServiceConfig};
use ticket_gateway_core::{
    signature::sign_payload, ChannelDispatcher, EnhancerError, HelpDeskPlugin,
    InMemoryTenantSource, IssueTrackerPlugin, JobReceiver, PlaintextSecretDecryptor,
    PluginManager, PluginRegistryBuilder, RetryPolicy, TenantCredentialStore, TenantId,
    TenantToolConfig, Ticket, TicketEnhancer, TicketMetadata, ToolApiClient,
    ToolApiClientConfig, ToolType, WebhookGateway,
};

pub const HELPDESK_HEADER: &str = "X-HelpDesk-Signature";
#[allow(dead_code)]
pub const TRACKER_HEADER: &str = "X-Hub-Signature";

// ============================================================================
// Stack
// ============================================================================

#[allow(dead_code)]
pub struct TestStack {
    pub router: Router,
    pub state: AppState,
    pub plugins: Arc<PluginManager>,
    pub tenants: Arc<InMemoryTenantSource>,
    pub dispatcher: Arc<ChannelDispatcher>,
    pub receiver: JobReceiver,
}

/// Secret each test tenant signs with
pub fn secret_for(tenant_id: &str) -> String {
    format!("{}-secret", tenant_id)
}

fn record(tenant_id: &str, tool_type: ToolType, base_url: &str) -> TenantToolConfig {
    TenantToolConfig {
        tenant_id: TenantId::new(tenant_id).unwrap(),
        tool_type,
        base_url: base_url.parse().unwrap(),
        api_username: match tool_type {
            ToolType::IssueTracker => Some(format!("bot@{}.example", tenant_id)),
            ToolType::HelpDesk => None,
        },
        api_credential: PlaintextSecretDecryptor::encode(&format!("{}-token", tenant_id)),
        webhook_secret: PlaintextSecretDecryptor::encode(&secret_for(tenant_id)),
        active: true,
    }
}

/// Client settings with short timeouts and fast retries
pub fn fast_client_config() -> ToolApiClientConfig {
    ToolApiClientConfig {
        read_timeout_ms: 200,
        write_timeout_ms: 200,
        retry: RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20), 2.0),
        ..ToolApiClientConfig::default()
    }
}

/// Build the stack with tenants `tenant-abc`, `tenant-def` (help desk) and
/// `tenant-xyz` (issue tracker), all pointing at `tool_base_url`
pub fn stack(tool_base_url: &str) -> TestStack {
    stack_with(tool_base_url, ServiceConfig::default())
}

pub fn stack_with(tool_base_url: &str, config: ServiceConfig) -> TestStack {
    let tenants = Arc::new(InMemoryTenantSource::with_tenants(vec![
        record("tenant-abc", ToolType::HelpDesk, tool_base_url),
        record("tenant-def", ToolType::HelpDesk, tool_base_url),
        record("tenant-xyz", ToolType::IssueTracker, tool_base_url),
    ]));
    let store = TenantCredentialStore::new(
        tenants.clone(),
        Arc::new(PlaintextSecretDecryptor::new()),
    );

    let mut builder = PluginRegistryBuilder::new();
    builder
        .register(
            ToolType::HelpDesk,
            Arc::new(HelpDeskPlugin::new(
                store.clone(),
                ToolApiClient::new("helpdesk", fast_client_config()).unwrap(),
            )),
        )
        .unwrap();
    builder
        .register(
            ToolType::IssueTracker,
            Arc::new(
                IssueTrackerPlugin::new(
                    store.clone(),
                    ToolApiClient::new("issue-tracker", fast_client_config()).unwrap(),
                )
                .unwrap(),
            ),
        )
        .unwrap();
    let plugins = Arc::new(builder.build());

    let (dispatcher, receiver) = ChannelDispatcher::new(config.gateway.queue_capacity);
    let dispatcher = Arc::new(dispatcher);
    let gateway = WebhookGateway::new(
        plugins.clone(),
        store,
        dispatcher.clone(),
        config.gateway.replay_window(),
    );

    let state = AppState::new(config, Arc::new(gateway), dispatcher.clone());

    TestStack {
        router: create_router(state.clone()),
        state,
        plugins,
        tenants,
        dispatcher,
        receiver,
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[allow(dead_code)]
pub fn helpdesk_payload(tenant_id: &str, ticket_id: u64) -> Value {
    let now = chrono::Utc::now().to_rfc3339();
    json!({
        "account": { "tenant_id": tenant_id },
        "event": { "type": "ticket.updated", "occurred_at": now },
        "ticket": {
            "id": ticket_id,
            "subject": "VPN drops every hour",
            "description": "Started after the client update",
            "priority": "high",
            "created_at": now
        }
    })
}

#[allow(dead_code)]
pub fn tracker_payload(tenant_id: &str, key: &str) -> Value {
    json!({
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "webhookEvent": "issue_created",
        "tenant_id": tenant_id,
        "issue": {
            "id": "10001",
            "key": key,
            "fields": {
                "summary": "Deploy blocked",
                "description": "Pipeline stuck on stage 3",
                "priority": { "name": "High" },
                "created": "2024-03-01T10:00:00.000+0200"
            }
        }
    })
}

/// POST `payload` to `/webhooks/{tool}` signed with `secret`
#[allow(dead_code)]
pub fn signed_request(tool: &str, header: &str, payload: &Value, secret: &str) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(secret.as_bytes(), &body).unwrap();
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{}", tool))
        .header("content-type", "application/json")
        .header(header, signature)
        .body(Body::from(body))
        .unwrap()
}

#[allow(dead_code)]
pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Enhancer
// ============================================================================

/// Enhancer returning fixed content and recording the tickets it saw
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingEnhancer {
    seen: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingEnhancer {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TicketEnhancer for RecordingEnhancer {
    async fn enhance(
        &self,
        ticket: &Ticket,
        _metadata: &TicketMetadata,
    ) -> Result<String, EnhancerError> {
        self.seen.lock().unwrap().push(ticket.id.clone());
        Ok(format!("Suggested next step for {}", ticket.summary))
    }
}
