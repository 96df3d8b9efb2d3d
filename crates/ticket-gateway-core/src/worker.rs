//! # Ticket Worker
//!
//! Processes dispatched jobs outside the webhook request: read the ticket,
//! ask the enhancer for content, write it back as a comment.
//!
//! Processing never raises. Every failure ends as a [`JobOutcome::Failed`]
//! with job and tenant context in the log.

use crate::dispatch::{DispatchedJob, JobReceiver};
use crate::plugin::{PluginError, PluginManager};
use crate::ticket::{Ticket, TicketMetadata};
use crate::ErrorCategory;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Enhancement boundary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnhancerError {
    #[error("Enhancement service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Enhancement rejected: {message}")]
    Rejected { message: String },

    #[error("Enhancement service returned an invalid response: {message}")]
    InvalidResponse { message: String },
}

impl EnhancerError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        if self.is_transient() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        }
    }
}

/// Produces the content written back to a ticket
#[async_trait]
pub trait TicketEnhancer: Send + Sync {
    async fn enhance(
        &self,
        ticket: &Ticket,
        metadata: &TicketMetadata,
    ) -> Result<String, EnhancerError>;
}

// ============================================================================
// Outcomes
// ============================================================================

/// Final state of a processed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Ticket was read and updated
    Completed,
    /// Ticket no longer exists in the tool
    TicketGone,
    Failed { reason: String, transient: bool },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn from_plugin_error(e: &PluginError) -> Self {
        Self::Failed {
            reason: e.to_string(),
            transient: e.is_transient(),
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Reads, enhances and updates tickets for dispatched jobs
#[derive(Clone)]
pub struct TicketWorker {
    plugins: Arc<PluginManager>,
    enhancer: Arc<dyn TicketEnhancer>,
}

impl TicketWorker {
    pub fn new(plugins: Arc<PluginManager>, enhancer: Arc<dyn TicketEnhancer>) -> Self {
        Self { plugins, enhancer }
    }

    /// Process one job to completion
    #[instrument(
        skip(self, job),
        fields(
            job_id = %job.job_id,
            tenant_id = %job.metadata.tenant_id(),
            ticket_id = %job.metadata.ticket_id(),
            tool_type = %job.metadata.tool_type(),
        )
    )]
    pub async fn process(&self, job: &DispatchedJob) -> JobOutcome {
        let outcome = self.run_job(job).await;
        match &outcome {
            JobOutcome::Completed => info!("Job completed"),
            JobOutcome::TicketGone => info!("Ticket no longer exists; job dropped"),
            JobOutcome::Failed { reason, transient } => {
                if *transient {
                    warn!(reason = %reason, transient = true, "Job failed");
                } else {
                    error!(reason = %reason, transient = false, "Job failed");
                }
            }
        }
        outcome
    }

    async fn run_job(&self, job: &DispatchedJob) -> JobOutcome {
        let metadata = &job.metadata;

        let plugin = match self.plugins.get(metadata.tool_type()) {
            Ok(plugin) => plugin,
            Err(e) => {
                error!(severity = "critical", error = %e, "No plugin for dispatched job");
                return JobOutcome::from_plugin_error(&e);
            }
        };

        let ticket = match plugin
            .get_ticket(metadata.tenant_id(), metadata.ticket_id())
            .await
        {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return JobOutcome::TicketGone,
            Err(e) => return JobOutcome::from_plugin_error(&e),
        };

        let content = match self.enhancer.enhance(&ticket, metadata).await {
            Ok(content) => content,
            Err(e) => {
                return JobOutcome::Failed {
                    reason: e.to_string(),
                    transient: e.is_transient(),
                }
            }
        };

        match plugin
            .update_ticket(metadata.tenant_id(), metadata.ticket_id(), &content)
            .await
        {
            Ok(true) => JobOutcome::Completed,
            Ok(false) => JobOutcome::Failed {
                reason: "tool did not accept the ticket update".to_string(),
                transient: false,
            },
            Err(e) => JobOutcome::from_plugin_error(&e),
        }
    }

    /// Process jobs until the receiver is closed and drained
    ///
    /// Returns the number of jobs processed.
    pub async fn run(&self, mut receiver: JobReceiver) -> usize {
        info!("Ticket worker started");
        let mut processed = 0usize;
        while let Some(job) = receiver.recv().await {
            self.process(&job).await;
            processed += 1;
        }
        info!(processed = processed, "Ticket worker stopped");
        processed
    }
}

impl std::fmt::Debug for TicketWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketWorker")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
