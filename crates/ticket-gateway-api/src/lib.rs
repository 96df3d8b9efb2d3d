//! # Ticket Gateway HTTP Service
//!
//! HTTP surface for receiving ticketing-tool webhooks and handing them to the
//! [`WebhookGateway`].
//!
//! Routes:
//! - `POST /webhooks/{tool_type}` webhook intake, answered with `202 Accepted`
//! - `GET /health` liveness with the registered tool types
//! - `GET /ready` readiness; fails once the job queue is closed

pub mod config;
pub mod errors;
pub mod responses;

pub use config::{
    EnhancerConfig, GatewayConfig, LoggingConfig, ServerConfig, ServiceConfig,
    TenantDirectoryConfig,
};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use responses::{HealthResponse, ReadinessResponse, WebhookResponse};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use std::{future::Future, sync::Arc, time::Duration};
use ticket_gateway_core::{
    CorrelationId, EnqueueDispatcher, InboundWebhook, Timestamp, WebhookGateway,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Webhook acceptance pipeline
    pub gateway: Arc<WebhookGateway>,

    /// Queue the gateway enqueues into; consulted for readiness
    pub dispatcher: Arc<dyn EnqueueDispatcher>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        gateway: Arc<WebhookGateway>,
        dispatcher: Arc<dyn EnqueueDispatcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            dispatcher,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/{tool_type}", post(handle_webhook))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until SIGINT or SIGTERM
///
/// In-flight requests finish before this returns.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let address = state.config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Starting HTTP server");

    let shutdown_timeout = Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    serve(listener, state, shutdown_signal(shutdown_timeout)).await
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle a webhook posted for one tool type
///
/// Authentication, normalization and enqueueing all happen before the
/// response; ticket processing happens later in the worker.
#[instrument(skip(state, headers, body))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(tool_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), WebhookHandlerError> {
    let webhook = InboundWebhook::new(
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str(), value.to_string()))
            }),
        body,
    );

    let accepted = state.gateway.accept(&tool_type, webhook).await?;

    info!(
        job_id = %accepted.job_id,
        tenant_id = %accepted.tenant_id,
        "Webhook accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(accepted.into())))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let plugins = state.gateway.plugins();

    if plugins.is_empty() {
        warn!("Health check failed: no plugins registered");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        tool_types: plugins.tool_types(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Readiness check for load balancers
#[instrument(skip(state))]
async fn handle_readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let is_ready = state.dispatcher.is_open() && !state.gateway.plugins().is_empty();

    if is_ready {
        Ok(Json(ReadinessResponse {
            ready: true,
            timestamp: Timestamp::now(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Correlation-id and request/response logging middleware
///
/// Reuses an inbound `x-correlation-id` when it is a UUID, otherwise
/// generates one, and echoes it on the response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<CorrelationId>().ok())
        .unwrap_or_default();
    let correlation = correlation_id.to_string();

    tracing::Span::current().record("correlation_id", correlation.as_str());
    request.extensions_mut().insert(correlation_id);

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
