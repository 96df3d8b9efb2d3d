//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use ticket_gateway_core::{ReplayWindow, ToolApiClientConfig};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook acceptance settings
    pub gateway: GatewayConfig,

    /// Outbound tool API settings shared by all plugins
    pub tool_client: ToolApiClientConfig,

    /// Tenant directory location
    pub tenants: TenantDirectoryConfig,

    /// Enhancement service used by the worker
    pub enhancer: EnhancerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.gateway.validate()?;

        self.tool_client
            .validate()
            .map_err(|e| ConfigError::Invalid {
                message: format!("tool_client: {}", e),
            })?;

        if self.tenants.directory_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                key: "tenants.directory_path".to_string(),
            });
        }

        self.enhancer.validate()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` string the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Webhook acceptance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum age of an event before it is treated as a replay; 0 disables the check
    pub replay_tolerance_seconds: u64,

    /// How far an event timestamp may lie in the future
    pub max_future_skew_seconds: u64,

    /// Capacity of the in-process job queue
    pub queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            replay_tolerance_seconds: ReplayWindow::DEFAULT_TOLERANCE.as_secs(),
            max_future_skew_seconds: ReplayWindow::DEFAULT_FUTURE_SKEW.as_secs(),
            queue_capacity: 1024,
        }
    }
}

impl GatewayConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "gateway.queue_capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Replay window described by this configuration
    pub fn replay_window(&self) -> ReplayWindow {
        if self.replay_tolerance_seconds == 0 {
            return ReplayWindow::disabled();
        }
        ReplayWindow::new(
            Duration::from_secs(self.replay_tolerance_seconds),
            Duration::from_secs(self.max_future_skew_seconds),
        )
    }
}

/// Location of the tenant directory file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantDirectoryConfig {
    pub directory_path: PathBuf,
}

impl Default for TenantDirectoryConfig {
    fn default() -> Self {
        Self {
            directory_path: PathBuf::from("config/tenants.yaml"),
        }
    }
}

/// Enhancement service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// Endpoint receiving `POST {ticket, metadata}`
    pub endpoint: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000/enhance".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl EnhancerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "enhancer.endpoint".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "enhancer.timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
