//! # Tool API Client
//!
//! Pooled HTTP client shared by every tenant of one plugin.
//!
//! The client owns connection pooling, timeouts and retries. It never holds
//! tenant state: the base URL and credential of each call arrive in the
//! [`ToolRequest`].
//!
//! Timeout phases:
//! - connect: TCP/TLS establishment (`connect_timeout`)
//! - read: each read of the response (`read_timeout`)
//! - write: the whole request/response exchange (`timeout`)
//! - pool acquire: waiting for one of `max_concurrent_requests` slots
//!
//! Network errors, timeouts, pool exhaustion and 5xx responses are retried
//! per [`RetryPolicy`]. 4xx responses are returned immediately.

use crate::retry::{RetryPolicy, RetryState};
use crate::tenant::SecretValue;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;
use zeroize::Zeroizing;

/// Maximum number of response-body characters kept in error messages
const ERROR_BODY_LIMIT: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Connection, timeout and retry settings for a [`ToolApiClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolApiClientConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub pool_acquire_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub pool_idle_timeout_ms: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for ToolApiClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            pool_acquire_timeout_ms: 10_000,
            max_concurrent_requests: 32,
            pool_idle_timeout_ms: 90_000,
            pool_max_idle_per_host: 16,
            user_agent: format!("ticket-gateway/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

impl ToolApiClientConfig {
    /// Check the settings can build a usable client
    pub fn validate(&self) -> Result<(), ToolApiError> {
        let invalid = |message: &str| {
            Err(ToolApiError::Configuration {
                message: message.to_string(),
            })
        };

        if self.connect_timeout_ms == 0
            || self.read_timeout_ms == 0
            || self.write_timeout_ms == 0
            || self.pool_acquire_timeout_ms == 0
        {
            return invalid("all timeouts must be greater than zero");
        }

        if self.max_concurrent_requests == 0 {
            return invalid("max_concurrent_requests must be greater than zero");
        }

        if self.retry.backoff_multiplier < 1.0 {
            return invalid("retry.backoff_multiplier must be at least 1.0");
        }

        Ok(())
    }
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Per-call authentication
///
/// `Debug` never prints credential material.
#[derive(Clone)]
pub enum AuthHeader {
    /// `Authorization: Bearer <token>`
    Bearer(SecretValue),
    /// `Authorization: Basic base64(<username>:<token>)`
    Basic { username: String, token: SecretValue },
    /// `<header>: <key>`
    ApiKey { header: String, key: SecretValue },
}

impl AuthHeader {
    fn to_header(&self) -> Result<(HeaderName, HeaderValue), ToolApiError> {
        let (name, value) = match self {
            Self::Bearer(token) => {
                let token = secret_str(token)?;
                (AUTHORIZATION, Zeroizing::new(format!("Bearer {}", token)))
            }
            Self::Basic { username, token } => {
                let token = secret_str(token)?;
                let pair = Zeroizing::new(format!("{}:{}", username, token));
                let encoded = base64::engine::general_purpose::STANDARD.encode(pair.as_bytes());
                (AUTHORIZATION, Zeroizing::new(format!("Basic {}", encoded)))
            }
            Self::ApiKey { header, key } => {
                let name = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                    ToolApiError::InvalidCredential {
                        message: format!("invalid API key header name '{}'", header),
                    }
                })?;
                (name, Zeroizing::new(secret_str(key)?.to_string()))
            }
        };

        let mut value =
            HeaderValue::from_str(&value).map_err(|_| ToolApiError::InvalidCredential {
                message: "credential contains characters not allowed in headers".to_string(),
            })?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

fn secret_str(secret: &SecretValue) -> Result<&str, ToolApiError> {
    secret.expose_str().ok_or_else(|| ToolApiError::InvalidCredential {
        message: "credential is not valid UTF-8".to_string(),
    })
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<REDACTED>)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("token", &"<REDACTED>")
                .finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"<REDACTED>")
                .finish(),
        }
    }
}

/// One outbound call: target, credential and optional JSON body
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub method: Method,
    pub url: Url,
    pub auth: AuthHeader,
    pub body: Option<serde_json::Value>,
}

impl ToolRequest {
    pub fn get(url: Url, auth: AuthHeader) -> Self {
        Self {
            method: Method::GET,
            url,
            auth,
            body: None,
        }
    }

    pub fn post(url: Url, auth: AuthHeader, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url,
            auth,
            body: Some(body),
        }
    }

    pub fn put(url: Url, auth: AuthHeader, body: serde_json::Value) -> Self {
        Self {
            method: Method::PUT,
            url,
            auth,
            body: Some(body),
        }
    }
}

/// Successful (2xx) response with its fully-read body
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ToolResponse {
    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ToolApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ToolApiError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Outbound API call failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolApiError {
    #[error("Resource not found")]
    NotFound,

    #[error("Authentication or permission failure (status {status})")]
    Unauthorized { status: u16 },

    #[error("Request rejected with status {status}: {message}")]
    ClientError { status: u16, message: String },

    #[error("Server error {status} after {attempts} attempts")]
    ServerError { status: u16, attempts: u32 },

    #[error("Network error after {attempts} attempts: {message}")]
    Network { message: String, attempts: u32 },

    #[error("Request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("No connection slot available after {attempts} attempts")]
    PoolExhausted { attempts: u32 },

    #[error("Client is closed")]
    Closed,

    #[error("Invalid credential: {message}")]
    InvalidCredential { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Client configuration error: {message}")]
    Configuration { message: String },
}

impl ToolApiError {
    /// Check if the failure class is retryable
    ///
    /// Errors returned from [`ToolApiClient::execute`] have already exhausted
    /// their retries; this reports the class, not whether to try again now.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
                | Self::PoolExhausted { .. }
        )
    }

    /// HTTP status behind the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::Unauthorized { status }
            | Self::ClientError { status, .. }
            | Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a single attempt that may be retried
#[derive(Debug)]
enum TransientFailure {
    Server(u16),
    Network(String),
    Timeout,
    PoolExhausted,
}

impl TransientFailure {
    fn into_error(self, attempts: u32) -> ToolApiError {
        match self {
            Self::Server(status) => ToolApiError::ServerError { status, attempts },
            Self::Network(message) => ToolApiError::Network { message, attempts },
            Self::Timeout => ToolApiError::Timeout { attempts },
            Self::PoolExhausted => ToolApiError::PoolExhausted { attempts },
        }
    }
}

enum AttemptError {
    Retryable(TransientFailure),
    Fatal(ToolApiError),
}

// ============================================================================
// Client
// ============================================================================

/// Pooled HTTP client for one tool's REST API
#[derive(Clone)]
pub struct ToolApiClient {
    name: String,
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: ToolApiClientConfig,
}

impl ToolApiClient {
    /// Build a client; `name` identifies it in logs
    pub fn new(name: impl Into<String>, config: ToolApiClientConfig) -> Result<Self, ToolApiError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .timeout(Duration::from_millis(config.write_timeout_ms))
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ToolApiError::Configuration {
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.into(),
            http,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ToolApiClientConfig {
        &self.config
    }

    /// Execute a request, retrying transient failures
    #[instrument(
        skip(self, request),
        fields(client = %self.name, method = %request.method, path = %request.url.path())
    )]
    pub async fn execute(&self, request: &ToolRequest) -> Result<ToolResponse, ToolApiError> {
        let policy = &self.config.retry;
        let mut state = RetryState::new();

        loop {
            match self.attempt(request).await {
                Ok(response) => {
                    debug!(
                        status = response.status,
                        attempts = state.total_attempts,
                        "Tool API call succeeded"
                    );
                    return Ok(response);
                }
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(failure)) => {
                    if self.is_closed() {
                        return Err(ToolApiError::Closed);
                    }

                    if !state.can_retry(policy) {
                        let error = failure.into_error(state.total_attempts);
                        warn!(
                            attempts = state.total_attempts,
                            error = %error,
                            "Tool API call failed after exhausting retries"
                        );
                        return Err(error);
                    }

                    let delay = state.get_delay(policy);
                    warn!(
                        attempt = state.total_attempts,
                        failure = ?failure,
                        delay_ms = delay.as_millis() as u64,
                        "Transient tool API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    state.next_attempt();
                }
            }
        }
    }

    async fn attempt(&self, request: &ToolRequest) -> Result<ToolResponse, AttemptError> {
        if self.is_closed() {
            return Err(AttemptError::Fatal(ToolApiError::Closed));
        }

        let acquire_timeout = Duration::from_millis(self.config.pool_acquire_timeout_ms);
        let _permit = match tokio::time::timeout(acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(AttemptError::Fatal(ToolApiError::Closed)),
            Err(_) => return Err(AttemptError::Retryable(TransientFailure::PoolExhausted)),
        };

        let (name, value) = request.auth.to_header().map_err(AttemptError::Fatal)?;
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .header(name, value);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status();

        // Read the body in full so the connection returns to the pool.
        let body = response.bytes().await.map_err(classify_send_error)?;

        classify_status(status, body)
    }

    /// Stop accepting new requests
    ///
    /// Calls already holding a connection slot run to completion; later calls
    /// fail with [`ToolApiError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.permits.close();
            info!(client = %self.name, "Tool API client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ToolApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolApiClient")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish()
    }
}

fn classify_send_error(error: reqwest::Error) -> AttemptError {
    if error.is_builder() {
        return AttemptError::Fatal(ToolApiError::Configuration {
            message: error.to_string(),
        });
    }

    if error.is_timeout() {
        AttemptError::Retryable(TransientFailure::Timeout)
    } else {
        AttemptError::Retryable(TransientFailure::Network(error.to_string()))
    }
}

fn classify_status(status: StatusCode, body: Bytes) -> Result<ToolResponse, AttemptError> {
    if status.is_success() {
        return Ok(ToolResponse {
            status: status.as_u16(),
            body,
        });
    }

    if status.is_server_error() {
        return Err(AttemptError::Retryable(TransientFailure::Server(
            status.as_u16(),
        )));
    }

    let error = match status {
        StatusCode::NOT_FOUND => ToolApiError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ToolApiError::Unauthorized {
            status: status.as_u16(),
        },
        s if s.is_client_error() => ToolApiError::ClientError {
            status: s.as_u16(),
            message: truncate_body(&body),
        },
        s => ToolApiError::InvalidResponse {
            message: format!("unexpected status {}", s.as_u16()),
        },
    };

    Err(AttemptError::Fatal(error))
}

fn truncate_body(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect()
}

#[cfg(test)]
#[path = "api_client_tests.rs"]
mod tests;
