//! # Enqueue Dispatcher
//!
//! Hands validated ticket metadata to the asynchronous processing queue.
//! The gateway only waits for the hand-off; ticket processing happens in the
//! worker.

use crate::ticket::TicketMetadata;
use crate::{ErrorCategory, JobId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Core Types
// ============================================================================

/// A queued unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedJob {
    pub job_id: JobId,
    pub metadata: TicketMetadata,
    pub enqueued_at: Timestamp,
}

impl DispatchedJob {
    pub fn new(metadata: TicketMetadata) -> Self {
        Self {
            job_id: JobId::new(),
            metadata,
            enqueued_at: Timestamp::now(),
        }
    }

    /// Key identifying the originating event: `tenant/ticket/event-millis`
    ///
    /// Two deliveries of the same tool event share a key.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.metadata.tenant_id(),
            self.metadata.ticket_id(),
            self.metadata.event_at().epoch_millis()
        )
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Processing queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Processing queue is closed")]
    Closed,

    #[error("Queue backend error: {message}")]
    Backend { message: String, transient: bool },
}

impl DispatchError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueFull { .. } => true,
            Self::Closed => false,
            Self::Backend { transient, .. } => *transient,
        }
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

// ============================================================================
// Dispatcher Trait
// ============================================================================

/// Interface to the processing queue
#[async_trait]
pub trait EnqueueDispatcher: Send + Sync {
    /// Queue a normalized record for processing
    async fn enqueue(&self, metadata: TicketMetadata) -> Result<JobId, DispatchError>;

    /// Whether the queue currently accepts work
    fn is_open(&self) -> bool;
}

// ============================================================================
// Channel Dispatcher
// ============================================================================

/// Bounded in-process queue backed by a tokio channel
///
/// Enqueue never waits for capacity; a full channel is reported
/// immediately so the webhook caller can retry.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<DispatchedJob>,
    capacity: usize,
    closed: Arc<watch::Sender<bool>>,
}

/// Receiving side of a [`ChannelDispatcher`]
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::Receiver<DispatchedJob>,
    closed: watch::Receiver<bool>,
}

impl JobReceiver {
    /// Next queued job
    ///
    /// After the dispatcher is closed the remaining jobs are drained, then
    /// `None` is returned.
    pub async fn recv(&mut self) -> Option<DispatchedJob> {
        loop {
            if *self.closed.borrow() {
                return self.receiver.try_recv().ok();
            }

            tokio::select! {
                job = self.receiver.recv() => return job,
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return self.receiver.recv().await;
                    }
                }
            }
        }
    }
}

impl ChannelDispatcher {
    /// Create a dispatcher holding at most `capacity` pending jobs
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = watch::channel(false);
        (
            Self {
                sender,
                capacity,
                closed: Arc::new(closed_tx),
            },
            JobReceiver {
                receiver,
                closed: closed_rx,
            },
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting new jobs
    ///
    /// Jobs already queued stay available to the receiver.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            info!("Dispatcher closed to new jobs");
        }
    }
}

#[async_trait]
impl EnqueueDispatcher for ChannelDispatcher {
    #[instrument(skip(self, metadata), fields(tenant_id = %metadata.tenant_id(), ticket_id = %metadata.ticket_id()))]
    async fn enqueue(&self, metadata: TicketMetadata) -> Result<JobId, DispatchError> {
        if !self.is_open() {
            return Err(DispatchError::Closed);
        }

        let job = DispatchedJob::new(metadata);
        let job_id = job.job_id;
        debug!(job_id = %job_id, dedup_key = %job.dedup_key(), "Enqueueing job");

        match self.sender.try_send(job) {
            Ok(()) => Ok(job_id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(capacity = self.capacity, "Processing queue full");
                Err(DispatchError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    fn is_open(&self) -> bool {
        !*self.closed.borrow() && !self.sender.is_closed()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
