//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ticket_gateway_core::{ErrorCategory, GatewayError};
use tracing::{error, warn};

/// Seconds a sender should wait before retrying a transient rejection
const RETRY_AFTER_SECONDS: u64 = 30;

/// Webhook handler errors with HTTP status code mapping
///
/// The status code comes from the gateway rejection:
///
/// - `401` authentication failures, including replayed events
/// - `403` inactive tenants
/// - `404` unknown tool routes
/// - `422` payloads that authenticated but could not be normalized
/// - `500` gateway misconfiguration
/// - `503` queue or tenant store unavailable, sent with a `Retry-After` header
///
/// Authentication failures never say which check failed. Server errors
/// return a generic message and keep the detail in the server log.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error(transparent)]
    Rejected(#[from] GatewayError),
}

impl WebhookHandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Rejected(e) => match e {
                GatewayError::Authentication { .. } => "Webhook authentication failed".to_string(),
                GatewayError::Configuration { .. } => {
                    "Internal server error occurred. Please try again later.".to_string()
                }
                GatewayError::TenantStoreUnavailable { .. } | GatewayError::Dispatch(_) => {
                    "Service temporarily unavailable. Please retry later.".to_string()
                }
                other => other.to_string(),
            },
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let Self::Rejected(ref rejection) = self;

        let retry_after = if status == StatusCode::SERVICE_UNAVAILABLE {
            Some(RETRY_AFTER_SECONDS)
        } else {
            None
        };

        if status.is_server_error() {
            error!(
                error = %rejection,
                category = ?rejection.error_category(),
                status = status.as_u16(),
                "Webhook rejected with server error"
            );
        } else if rejection.error_category() == ErrorCategory::Security {
            warn!(status = status.as_u16(), "Webhook rejected by security checks");
        }

        let body = serde_json::json!({
            "error": self.client_message(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}
