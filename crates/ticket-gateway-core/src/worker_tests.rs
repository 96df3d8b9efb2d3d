//! Tests for the ticket worker.

use super::*;
use crate::api_client::ToolApiError;
use crate::dispatch::{ChannelDispatcher, EnqueueDispatcher};
use crate::plugin::{PluginRegistryBuilder, TicketingToolPlugin};
use crate::tenant::TenantCredentials;
use crate::ticket::Priority;
use crate::{TenantId, Timestamp, ToolType, ValidationError};
use serde_json::Value;
use std::sync::Mutex;

// ============================================================================
// Test doubles
// ============================================================================

/// Scripted plugin recording the calls the worker makes
struct ScriptedPlugin {
    ticket: Result<Option<Ticket>, PluginError>,
    update: Result<bool, PluginError>,
    updates: Mutex<Vec<(String, String)>>,
}

impl ScriptedPlugin {
    fn new(ticket: Result<Option<Ticket>, PluginError>, update: Result<bool, PluginError>) -> Self {
        Self {
            ticket,
            update,
            updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TicketingToolPlugin for ScriptedPlugin {
    fn tool_type(&self) -> ToolType {
        ToolType::HelpDesk
    }

    fn tenant_field_path(&self) -> &'static str {
        "tenant_id"
    }

    fn signature_header(&self) -> &'static str {
        "X-Signature"
    }

    fn validate_webhook(
        &self,
        _raw_body: &[u8],
        _signature_header: Option<&str>,
        _credentials: &TenantCredentials,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn event_timestamp(&self, _payload: &Value) -> Result<Timestamp, ValidationError> {
        Ok(Timestamp::now())
    }

    fn extract_metadata(&self, _payload: &Value) -> Result<TicketMetadata, ValidationError> {
        Err(ValidationError::Required {
            field: "unused".to_string(),
        })
    }

    async fn get_ticket(
        &self,
        _tenant_id: &TenantId,
        _ticket_id: &str,
    ) -> Result<Option<Ticket>, PluginError> {
        self.ticket.clone()
    }

    async fn update_ticket(
        &self,
        _tenant_id: &TenantId,
        ticket_id: &str,
        content: &str,
    ) -> Result<bool, PluginError> {
        self.updates
            .lock()
            .unwrap()
            .push((ticket_id.to_string(), content.to_string()));
        self.update.clone()
    }

    fn close(&self) {}
}

struct FixedEnhancer(Result<String, EnhancerError>);

#[async_trait]
impl TicketEnhancer for FixedEnhancer {
    async fn enhance(
        &self,
        ticket: &Ticket,
        _metadata: &TicketMetadata,
    ) -> Result<String, EnhancerError> {
        self.0
            .clone()
            .map(|content| format!("{}: {}", ticket.summary, content))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn ticket() -> Ticket {
    Ticket {
        id: "4711".to_string(),
        summary: "Printer on fire".to_string(),
        description: None,
        status: Some("open".to_string()),
        priority: Some("urgent".to_string()),
        created_at: None,
        updated_at: None,
    }
}

fn job(tool_type: ToolType) -> DispatchedJob {
    let now = Timestamp::now();
    DispatchedJob::new(
        TicketMetadata::new(
            TenantId::new("tenant-abc").unwrap(),
            "4711",
            "Printer on fire",
            None,
            Priority::Critical,
            now,
            now,
            tool_type,
        )
        .unwrap(),
    )
}

fn worker(plugin: Arc<ScriptedPlugin>, enhancer: FixedEnhancer) -> TicketWorker {
    let mut builder = PluginRegistryBuilder::new();
    builder.register(ToolType::HelpDesk, plugin).unwrap();
    TicketWorker::new(Arc::new(builder.build()), Arc::new(enhancer))
}

fn suggest() -> FixedEnhancer {
    FixedEnhancer(Ok("unplug it".to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_ticket_is_read_enhanced_and_updated() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(Some(ticket())), Ok(true)));
    let outcome = worker(plugin.clone(), suggest())
        .process(&job(ToolType::HelpDesk))
        .await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert!(outcome.is_success());
    assert_eq!(
        plugin.updates.lock().unwrap().as_slice(),
        &[("4711".to_string(), "Printer on fire: unplug it".to_string())]
    );
}

#[tokio::test]
async fn test_missing_ticket_ends_job_without_update() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(None), Ok(true)));
    let outcome = worker(plugin.clone(), suggest())
        .process(&job(ToolType::HelpDesk))
        .await;

    assert_eq!(outcome, JobOutcome::TicketGone);
    assert!(plugin.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_update_is_a_permanent_failure() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(Some(ticket())), Ok(false)));
    let outcome = worker(plugin, suggest())
        .process(&job(ToolType::HelpDesk))
        .await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            transient: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_read_timeout_becomes_transient_failure() {
    let plugin = Arc::new(ScriptedPlugin::new(
        Err(PluginError::ToolApi(ToolApiError::Timeout { attempts: 4 })),
        Ok(true),
    ));
    let outcome = worker(plugin, suggest())
        .process(&job(ToolType::HelpDesk))
        .await;

    assert!(matches!(outcome, JobOutcome::Failed { transient: true, .. }));
}

#[tokio::test]
async fn test_enhancer_failure_skips_update() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(Some(ticket())), Ok(true)));
    let enhancer = FixedEnhancer(Err(EnhancerError::Unavailable {
        message: "503".to_string(),
    }));

    let outcome = worker(plugin.clone(), enhancer)
        .process(&job(ToolType::HelpDesk))
        .await;

    assert!(matches!(outcome, JobOutcome::Failed { transient: true, .. }));
    assert!(plugin.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_job_for_unregistered_tool_fails() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(Some(ticket())), Ok(true)));
    let outcome = worker(plugin, suggest())
        .process(&job(ToolType::IssueTracker))
        .await;

    assert!(matches!(outcome, JobOutcome::Failed { transient: false, .. }));
}

#[tokio::test]
async fn test_run_drains_queue_until_closed() {
    let plugin = Arc::new(ScriptedPlugin::new(Ok(Some(ticket())), Ok(true)));
    let worker = worker(plugin.clone(), suggest());
    let (dispatcher, receiver) = ChannelDispatcher::new(8);

    for _ in 0..3 {
        dispatcher
            .enqueue(job(ToolType::HelpDesk).metadata)
            .await
            .unwrap();
    }
    dispatcher.close();

    assert_eq!(worker.run(receiver).await, 3);
    assert_eq!(plugin.updates.lock().unwrap().len(), 3);
}
