//! The publish side of the relay.
//!
//! Accepts a validated submission, fills in identity and timestamp, and
//! hands the encoded message to the queue. The call is synchronous from the
//! HTTP caller's perspective: it returns once the queue has confirmed
//! acceptance, not after downstream delivery. There is no local retry —
//! retrying here risks duplicate enqueue, and the caller can safely retry
//! with the same id.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use courier_proto::{Message, QueueClient, QueueError};

/// Result type alias for publish operations.
pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Errors raised while publishing a message.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The queue refused or could not be reached.
    #[error("publish failed: {0}")]
    Queue(#[from] QueueError),

    /// The message could not be encoded to the wire format.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A validated inbound submission, before identity is assigned.
#[derive(Debug, Clone, Default)]
pub struct MessageSubmission {
    pub user_id: String,
    pub content: String,
    /// Caller-supplied idempotency id. Generated when absent.
    pub id: Option<String>,
    /// Origin service tag. Defaults to `"unknown"`.
    pub service: Option<String>,
}

/// Publishes accepted messages to the durable queue.
pub struct Publisher {
    queue: Arc<dyn QueueClient>,
    topic: String,
}

impl Publisher {
    /// Create a publisher writing to `topic`.
    pub fn new(queue: Arc<dyn QueueClient>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
        }
    }

    /// Publish one submission. Returns the message id (the caller's, or a
    /// freshly generated one) once the queue has accepted the message.
    pub async fn publish(&self, submission: MessageSubmission) -> PublishResult<String> {
        let id = submission
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let message = Message {
            id: id.clone(),
            user_id: submission.user_id,
            content: submission.content,
            service: submission.service.unwrap_or_else(|| "unknown".to_string()),
            created_at: Utc::now(),
        };

        let payload = message.to_bytes()?;
        let queue_id = self.queue.publish(&self.topic, &payload).await?;
        info!(message_id = %id, queue_id = %queue_id, topic = %self.topic, "message published");
        Ok(id)
    }
}
