//! The message wire model.
//!
//! A [`Message`] is the unit of work flowing through the relay: created at
//! the ingestion edge, serialized to JSON for the queue, decoded again by the
//! subscriber, and forwarded to the delivery target. Its `id` is the sole
//! deduplication key and is immutable once assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum accepted `content` size in bytes.
pub const MAX_CONTENT_BYTES: usize = 4096;

/// A relayed message as encoded on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id; the idempotency key for deduplication.
    pub id: String,

    /// Opaque identifier of the originating user, passed through unmodified.
    pub user_id: String,

    /// The payload body.
    pub content: String,

    /// Origin service tag (`"unknown"` when the producer did not say).
    pub service: String,

    /// Set by the publisher at publish time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Serialize to the queue wire format (JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from the queue wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: "m-1".to_string(),
            user_id: "u-1".to_string(),
            content: "hello".to_string(),
            service: "web".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_through_wire_format() {
        let message = sample();
        let bytes = message.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn wire_format_uses_expected_field_names() {
        let bytes = sample().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["id"], "m-1");
        assert_eq!(value["user_id"], "u-1");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["service"], "web");
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn rejects_payload_missing_required_fields() {
        let result = Message::from_bytes(br#"{"id":"m-1"}"#);
        assert!(result.is_err());
    }
}
