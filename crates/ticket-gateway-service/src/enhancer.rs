//! HTTP client for the enhancement service.
//!
//! The worker sends `POST {"ticket": .., "metadata": ..}` and expects
//! `{"content": ".."}` back. Connection failures, timeouts and 5xx answers
//! are transient; any other non-success status is a rejection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ticket_gateway_core::{EnhancerError, Ticket, TicketEnhancer, TicketMetadata};
use tracing::{debug, instrument};

#[derive(Serialize)]
struct EnhanceRequest<'a> {
    ticket: &'a Ticket,
    metadata: &'a TicketMetadata,
}

#[derive(Deserialize)]
struct EnhanceResponse {
    content: String,
}

/// [`TicketEnhancer`] backed by an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpTicketEnhancer {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpTicketEnhancer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, EnhancerError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| EnhancerError::Rejected {
            message: format!("invalid endpoint '{}': {}", endpoint, e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnhancerError::Unavailable {
                message: e.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TicketEnhancer for HttpTicketEnhancer {
    #[instrument(skip(self, ticket, metadata), fields(ticket_id = %ticket.id))]
    async fn enhance(
        &self,
        ticket: &Ticket,
        metadata: &TicketMetadata,
    ) -> Result<String, EnhancerError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EnhanceRequest { ticket, metadata })
            .send()
            .await
            .map_err(|e| EnhancerError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Enhancement service responded");

        if status.is_server_error() {
            return Err(EnhancerError::Unavailable {
                message: format!("enhancement service returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(EnhancerError::Rejected {
                message: format!("enhancement service returned {}", status),
            });
        }

        let body: EnhanceResponse =
            response
                .json()
                .await
                .map_err(|e| EnhancerError::InvalidResponse {
                    message: e.to_string(),
                })?;

        if body.content.trim().is_empty() {
            return Err(EnhancerError::InvalidResponse {
                message: "empty content".to_string(),
            });
        }

        Ok(body.content)
    }
}

#[cfg(test)]
#[path = "enhancer_tests.rs"]
mod tests;
