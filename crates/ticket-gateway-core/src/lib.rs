//! # Ticket-Gateway Core
//!
//! Core business logic for the multi-tenant ticketing-tool integration layer.
//!
//! This crate authenticates inbound webhooks per tenant, normalizes vendor
//! payloads into canonical [`ticket::TicketMetadata`], and exposes a uniform
//! plugin contract for reading and updating tickets across ticketing tools.
//!
//! ## Architecture
//!
//! - Tool integrations implement [`plugin::TicketingToolPlugin`] and are
//!   registered once at startup in a [`plugin::PluginManager`]
//! - Tenant credentials are resolved per call through
//!   [`tenant::TenantCredentialStore`]; decrypted secrets never outlive the call
//! - The [`gateway::WebhookGateway`] runs the ordered acceptance pipeline and
//!   hands records to an [`dispatch::EnqueueDispatcher`]
//! - The [`worker::TicketWorker`] reads and updates tickets out of band
//!
//! ## Usage
//!
//! ```rust
//! use ticket_gateway_core::{JobId, TenantId, ToolType};
//!
//! let tenant = TenantId::new("tenant-abc").unwrap();
//! let tool: ToolType = "issue-tracker".parse().unwrap();
//! let job = JobId::new();
//!
//! assert_eq!(tenant.as_str(), "tenant-abc");
//! assert_eq!(tool, ToolType::IssueTracker);
//! assert!(!job.to_string().is_empty());
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier of an isolated customer account
///
/// All credentials, secrets and webhook traffic are partitioned by tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Maximum length of a tenant identifier
    pub const MAX_LENGTH: usize = 64;

    /// Create new tenant ID with validation
    ///
    /// # Validation Rules
    /// - Must be 1-64 characters
    /// - Must contain only ASCII alphanumerics, hyphens and underscores
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "tenant_id".to_string(),
            });
        }

        if value.len() > Self::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "tenant_id".to_string(),
                max_length: Self::MAX_LENGTH,
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidCharacters {
                field: "tenant_id".to_string(),
                invalid_chars: "non-alphanumeric except hyphens and underscores".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Ticketing tools with a registered integration
///
/// The set is closed: adding a tool means adding a variant here and
/// registering a plugin for it. Dispatch code never matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolType {
    /// Help-desk style tool with plain-text comments
    HelpDesk,
    /// Issue tracker with rich-text document comments
    IssueTracker,
}

impl ToolType {
    /// All known tool types, in registration order
    pub const ALL: [ToolType; 2] = [ToolType::HelpDesk, ToolType::IssueTracker];

    /// Stable string identifier used in routes and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HelpDesk => "helpdesk",
            Self::IssueTracker => "issue-tracker",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ParseError::InvalidFormat {
                expected: "helpdesk or issue-tracker".to_string(),
                actual: s.to_string(),
            })
    }
}

impl TryFrom<String> for ToolType {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolType> for String {
    fn from(value: ToolType) -> Self {
        value.as_str().to_string()
    }
}

/// Unique identifier for dispatched jobs
///
/// Uses ULID for lexicographic sorting and global uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    /// Generate a new unique job ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

// ============================================================================
// Time and Metadata Types
// ============================================================================

/// UTC timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from an RFC3339 string with any offset
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Parse an ISO-8601 timestamp whose offset has no colon (`+0200`)
    ///
    /// RFC3339 input is accepted as well.
    pub fn from_iso8601_compact(s: &str) -> Result<Self, ParseError> {
        if let Ok(ts) = Self::from_rfc3339(s) {
            return Ok(ts);
        }

        let dt = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
            .map_err(|_| ParseError::InvalidFormat {
                expected: "ISO-8601 datetime with offset".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Create timestamp from milliseconds since the Unix epoch
    pub fn from_epoch_millis(millis: i64) -> Result<Self, ParseError> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Self)
            .ok_or_else(|| ParseError::InvalidFormat {
                expected: "epoch milliseconds in range".to_string(),
                actual: millis.to_string(),
            })
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Milliseconds since the Unix epoch
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Signed age of this timestamp relative to `now`
    ///
    /// Negative when the timestamp lies in the future.
    pub fn age_at(&self, now: Timestamp) -> chrono::Duration {
        now.0.signed_duration_since(self.0)
    }

    /// Subtract duration from timestamp
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 - chrono_duration)
    }

    /// Add duration to timestamp
    pub fn add_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 + chrono_duration)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// Identifier for tracing requests across system boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that should be retried
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring immediate attention
    Security,
    /// Configuration errors indicating a deployment mismatch
    Configuration,
}

/// Error type for input validation failures
///
/// Raised by metadata extraction; a payload producing one of these never
/// reaches the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },

    #[error("Field '{field}' has unmapped value '{value}'")]
    UnmappedValue { field: String, value: String },

    #[error("Payload is not valid JSON: {message}")]
    MalformedPayload { message: String },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Canonical ticket model and priority vocabulary
pub mod ticket;

/// HMAC-SHA256 webhook signature helpers and the replay window
pub mod signature;

/// Tenant credential resolution and the decryption boundary
pub mod tenant;

/// Exponential backoff policy for outbound calls
pub mod retry;

/// Pooled HTTP client for tool REST APIs
pub mod api_client;

/// Plugin contract, registry and concrete tool integrations
pub mod plugin;

/// Ordered webhook acceptance pipeline
pub mod gateway;

/// Hand-off of normalized records to the worker queue
pub mod dispatch;

/// Out-of-band ticket read/update processing
pub mod worker;

/// Infrastructure adapters
pub mod adapters;

// Re-export key types for convenience
pub use adapters::{InMemoryTenantSource, PlaintextSecretDecryptor};
pub use api_client::{AuthHeader, ToolApiClient, ToolApiClientConfig, ToolApiError};
pub use dispatch::{ChannelDispatcher, DispatchError, DispatchedJob, EnqueueDispatcher, JobReceiver};
pub use gateway::{Accepted, GatewayError, InboundWebhook, WebhookGateway};
pub use plugin::{
    HelpDeskPlugin, IssueTrackerPlugin, PluginError, PluginManager, PluginRegistryBuilder,
    TicketingToolPlugin,
};
pub use retry::{RetryPolicy, RetryState};
pub use signature::{ReplayWindow, SignatureError};
pub use tenant::{
    SecretValue, TenantCredentialStore, TenantCredentials, TenantError, TenantToolConfig,
};
pub use ticket::{Priority, Ticket, TicketMetadata};
pub use worker::{EnhancerError, JobOutcome, TicketEnhancer, TicketWorker};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
