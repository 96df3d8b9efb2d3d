//! Tests for the webhook acceptance pipeline.

use super::*;
use crate::adapters::{InMemoryTenantSource, PlaintextSecretDecryptor};
use crate::api_client::{ToolApiClient, ToolApiClientConfig};
use crate::plugin::{HelpDeskPlugin, IssueTrackerPlugin, PluginRegistryBuilder};
use crate::signature::sign_payload;
use crate::tenant::{
    DecryptError, EncryptedSecret, SecretDecryptor, SecretValue, TenantConfigSource,
    TenantStoreError, TenantToolConfig,
};
use crate::ticket::TicketMetadata;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct CountingDecryptor {
    calls: AtomicUsize,
    inner: PlaintextSecretDecryptor,
}

#[async_trait]
impl SecretDecryptor for CountingDecryptor {
    async fn decrypt(
        &self,
        tenant_id: &TenantId,
        secret: &EncryptedSecret,
    ) -> Result<SecretValue, DecryptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(tenant_id, secret).await
    }
}

/// Tenant source that counts reads of the configuration store
struct CountingSource {
    loads: AtomicUsize,
    inner: InMemoryTenantSource,
}

#[async_trait]
impl TenantConfigSource for CountingSource {
    async fn load(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantToolConfig>, TenantStoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(tenant_id).await
    }
}

/// Dispatcher that records what it was given
#[derive(Default)]
struct RecordingDispatcher {
    jobs: Mutex<Vec<TicketMetadata>>,
    fail_with: Option<DispatchError>,
}

impl RecordingDispatcher {
    fn failing(error: DispatchError) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl EnqueueDispatcher for RecordingDispatcher {
    async fn enqueue(&self, metadata: TicketMetadata) -> Result<JobId, DispatchError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.jobs.lock().unwrap().push(metadata);
        Ok(JobId::new())
    }

    fn is_open(&self) -> bool {
        self.fail_with.is_none()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

fn record(id: &str, tool_type: ToolType, active: bool) -> TenantToolConfig {
    TenantToolConfig {
        tenant_id: tenant(id),
        tool_type,
        base_url: Url::parse("http://127.0.0.1:1").unwrap(),
        api_username: None,
        api_credential: PlaintextSecretDecryptor::encode("token"),
        webhook_secret: PlaintextSecretDecryptor::encode(&format!("{}-secret", id)),
        active,
    }
}

struct Harness {
    gateway: WebhookGateway,
    source: Arc<CountingSource>,
    decryptor: Arc<CountingDecryptor>,
    dispatcher: Arc<RecordingDispatcher>,
}

fn harness_with(dispatcher: RecordingDispatcher, helpdesk_only: bool) -> Harness {
    let source = Arc::new(CountingSource {
        loads: AtomicUsize::new(0),
        inner: InMemoryTenantSource::with_tenants(vec![
            record("tenant-abc", ToolType::HelpDesk, true),
            record("tenant-xyz", ToolType::HelpDesk, true),
            record("tenant-off", ToolType::HelpDesk, false),
            record("tenant-it", ToolType::IssueTracker, true),
        ]),
    });
    let decryptor = Arc::new(CountingDecryptor::default());
    let store = TenantCredentialStore::new(source.clone(), decryptor.clone());

    let client = || ToolApiClient::new("test", ToolApiClientConfig::default()).unwrap();
    let mut builder = PluginRegistryBuilder::new();
    builder
        .register(
            ToolType::HelpDesk,
            Arc::new(HelpDeskPlugin::new(store.clone(), client())),
        )
        .unwrap();
    if !helpdesk_only {
        builder
            .register(
                ToolType::IssueTracker,
                Arc::new(IssueTrackerPlugin::new(store.clone(), client()).unwrap()),
            )
            .unwrap();
    }

    let dispatcher = Arc::new(dispatcher);
    let gateway = WebhookGateway::new(
        Arc::new(builder.build()),
        store,
        dispatcher.clone(),
        ReplayWindow::default(),
    );

    Harness {
        gateway,
        source,
        decryptor,
        dispatcher,
    }
}

fn harness() -> Harness {
    harness_with(RecordingDispatcher::default(), false)
}

fn helpdesk_payload(tenant_id: &str) -> Value {
    json!({
        "account": { "tenant_id": tenant_id },
        "event": { "type": "ticket.created", "occurred_at": "2024-03-01T10:15:00+02:00" },
        "ticket": {
            "id": 4711,
            "subject": "Printer on fire",
            "description": "Third floor",
            "priority": "urgent",
            "created_at": "2024-03-01T10:14:03+02:00"
        }
    })
}

fn event_time() -> Timestamp {
    Timestamp::from_rfc3339("2024-03-01T08:15:30Z").unwrap()
}

fn signed(payload: &Value, header: &str, secret: &str) -> InboundWebhook {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(secret.as_bytes(), &body).unwrap();
    InboundWebhook::new([(header, signature)], body)
}

fn signed_helpdesk(tenant_id: &str, secret: &str) -> InboundWebhook {
    signed(&helpdesk_payload(tenant_id), "X-HelpDesk-Signature", secret)
}

// ============================================================================
// Accepted webhooks
// ============================================================================

#[tokio::test]
async fn test_valid_webhook_is_enqueued_and_acknowledged() {
    let h = harness();

    let accepted = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-abc", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap();

    assert_eq!(accepted.tenant_id, tenant("tenant-abc"));
    assert_eq!(accepted.tool_type, ToolType::HelpDesk);

    let jobs = h.dispatcher.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].ticket_id(), "4711");
    assert_eq!(jobs[0].tenant_id(), &tenant("tenant-abc"));
}

/// Tenant configuration is read once per webhook; later stages work on that
/// snapshot.
#[tokio::test]
async fn test_tenant_record_is_loaded_once_per_webhook() {
    let h = harness();

    h.gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-abc", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap();

    assert_eq!(h.source.loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.decryptor.calls.load(Ordering::SeqCst), 2);

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-xyz", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(h.source.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_signature_header_lookup_ignores_case() {
    let h = harness();
    let body = serde_json::to_vec(&helpdesk_payload("tenant-abc")).unwrap();
    let signature = sign_payload(b"tenant-abc-secret", &body).unwrap();
    let webhook = InboundWebhook::new([("x-helpdesk-signature", signature)], body);

    assert!(h
        .gateway
        .accept_at("helpdesk", webhook, event_time())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_issue_tracker_webhook_is_accepted() {
    let h = harness();
    let payload = json!({
        "timestamp": event_time().epoch_millis(),
        "webhookEvent": "issue_created",
        "tenant_id": "tenant-it",
        "issue": {
            "key": "OPS-7",
            "fields": {
                "summary": "Disk full",
                "description": null,
                "priority": { "name": "Lowest" },
                "created": "2024-03-01T08:00:00.000+0000"
            }
        }
    });

    let accepted = h
        .gateway
        .accept_at(
            "issue-tracker",
            signed(&payload, "X-Hub-Signature", "tenant-it-secret"),
            event_time(),
        )
        .await
        .unwrap();

    assert_eq!(accepted.tool_type, ToolType::IssueTracker);
    assert_eq!(h.dispatcher.count(), 1);
}

// ============================================================================
// Authentication failures
// ============================================================================

#[tokio::test]
async fn test_cross_tenant_signature_is_rejected() {
    let h = harness();

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-abc", "tenant-xyz-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let h = harness();
    let body = serde_json::to_vec(&helpdesk_payload("tenant-abc")).unwrap();
    let webhook = InboundWebhook::new(Vec::<(String, String)>::new(), body);

    let err = h
        .gateway
        .accept_at("helpdesk", webhook, event_time())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Authentication { .. }));
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_unknown_tenant_is_rejected_without_decryption() {
    let h = harness();

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-ghost", "whatever"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(h.decryptor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unparsable_body_is_an_authentication_failure() {
    let h = harness();
    let webhook = InboundWebhook::new([("X-HelpDesk-Signature", "sha256=00")], "not json");

    let err = h
        .gateway
        .accept_at("helpdesk", webhook, event_time())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_webhook_on_wrong_tool_route_is_rejected() {
    let h = harness();
    let mut payload = helpdesk_payload("tenant-abc");
    payload["tenant_id"] = json!("tenant-abc");

    let err = h
        .gateway
        .accept_at(
            "issue-tracker",
            signed(&payload, "X-Hub-Signature", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Authentication { tenant_id: Some(ref t), .. } if t.as_str() == "tenant-abc"
    ));
    assert_eq!(h.source.loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_stale_event_is_rejected_after_signature_check() {
    let h = harness();
    let later = event_time().add_duration(Duration::from_secs(3600));

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-abc", "tenant-abc-secret"),
            later,
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(h.dispatcher.count(), 0);
}

// ============================================================================
// Other rejections
// ============================================================================

/// The inactive check happens before any secret is decrypted.
#[tokio::test]
async fn test_inactive_tenant_is_forbidden_before_decryption() {
    let h = harness();

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-off", "tenant-off-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::TenantInactive { .. }));
    assert_eq!(err.status_code(), 403);
    assert_eq!(h.source.loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.decryptor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_ticket_id_is_unprocessable_and_not_enqueued() {
    let h = harness();
    let mut payload = helpdesk_payload("tenant-abc");
    payload["ticket"].as_object_mut().unwrap().remove("id");

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed(&payload, "X-HelpDesk-Signature", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 422);
    assert!(matches!(
        err,
        GatewayError::Validation(ValidationError::Required { ref field }) if field == "ticket.id"
    ));
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = harness();

    let err = h
        .gateway
        .accept_at("fax-machine", InboundWebhook::default(), event_time())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_tenant_tool_without_plugin_is_a_configuration_error() {
    let h = harness_with(RecordingDispatcher::default(), true);
    // Routed to the help-desk plugin but the tenant is configured for the
    // unregistered issue tracker.
    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-it", "tenant-it-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Configuration { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.source.loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.dispatcher.count(), 0);

    let err = h
        .gateway
        .accept_at("issue-tracker", InboundWebhook::default(), event_time())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_full_queue_is_service_unavailable() {
    let h = harness_with(
        RecordingDispatcher::failing(DispatchError::QueueFull { capacity: 1 }),
        false,
    );

    let err = h
        .gateway
        .accept_at(
            "helpdesk",
            signed_helpdesk("tenant-abc", "tenant-abc-secret"),
            event_time(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 503);
    assert!(err.is_transient());
}

#[test]
fn test_error_categories() {
    assert_eq!(
        GatewayError::TenantInactive {
            tenant_id: tenant("t")
        }
        .error_category(),
        ErrorCategory::Security
    );
    assert_eq!(
        GatewayError::Configuration {
            message: "x".to_string()
        }
        .error_category(),
        ErrorCategory::Configuration
    );
}
