//! Durable queue abstractions.
//!
//! [`QueueClient`] is the narrow seam to the external broker: publish on one
//! side, pull/ack/nack on the other. Production code uses the HTTP adapter in
//! `courier-adapters`; tests substitute an in-memory implementation. The
//! subscriber loop wraps each pulled message's ack id in an [`AckHandle`] so
//! acknowledgment lifetime stays scoped to the worker processing it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by the durable queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue could not be reached (connect failure, timeout).
    #[error("queue unreachable: {0}")]
    Unreachable(String),

    /// The queue answered but refused the request.
    #[error("queue rejected request with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The queue answered with a body we could not interpret.
    #[error("malformed queue response: {0}")]
    Malformed(String),
}

/// One message received from a pull, paired with its acknowledgment id.
#[derive(Debug, Clone)]
pub struct PulledMessage {
    /// Opaque ack token the queue issued for this delivery.
    pub ack_id: String,

    /// The raw message payload as published.
    pub payload: Vec<u8>,
}

/// Client for the external durable queue's publish and pull/ack primitives.
///
/// No business logic lives behind this trait; implementations only translate
/// calls to the broker's protocol.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Publish a payload to a topic. Returns the queue's native message id
    /// once the queue has confirmed acceptance.
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<String>;

    /// Pull up to `max` pending messages from a subscription. May long-poll;
    /// an empty batch is not an error.
    async fn pull(&self, subscription: &str, max: usize) -> QueueResult<Vec<PulledMessage>>;

    /// Acknowledge a message: processed, safe to remove from the queue.
    async fn ack(&self, subscription: &str, ack_id: &str) -> QueueResult<()>;

    /// Negative-acknowledge a message: request immediate redelivery.
    async fn nack(&self, subscription: &str, ack_id: &str) -> QueueResult<()>;

    /// Lightweight reachability probe of the publish path. Must not publish.
    async fn check(&self) -> QueueResult<()>;
}

/// Scoped acknowledgment handle for one in-flight message.
///
/// Constructed by the subscriber loop and handed to the forwarder together
/// with the decoded message. Holding the handle rather than a global client
/// keeps ack lifetime explicit and lets tests observe ack/nack decisions.
#[derive(Clone)]
pub struct AckHandle {
    queue: Arc<dyn QueueClient>,
    subscription: String,
    ack_id: String,
}

impl AckHandle {
    /// Create a handle for one pulled message.
    pub fn new(queue: Arc<dyn QueueClient>, subscription: impl Into<String>, ack_id: impl Into<String>) -> Self {
        Self {
            queue,
            subscription: subscription.into(),
            ack_id: ack_id.into(),
        }
    }

    /// The queue-issued ack token.
    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// Acknowledge the underlying queue message.
    pub async fn ack(&self) -> QueueResult<()> {
        self.queue.ack(&self.subscription, &self.ack_id).await
    }

    /// Negative-acknowledge the underlying queue message.
    pub async fn nack(&self) -> QueueResult<()> {
        self.queue.nack(&self.subscription, &self.ack_id).await
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("subscription", &self.subscription)
            .field("ack_id", &self.ack_id)
            .finish_non_exhaustive()
    }
}
