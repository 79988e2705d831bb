//! Delivery target abstractions.
//!
//! The delivery target is the downstream chat-bot HTTP endpoint. The trait
//! carries no retry or dedup logic; classifying an error as transient or
//! permanent is the one piece of judgment an implementation must make, and
//! the forwarder's retry policy is built on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for delivery operations.
pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;

/// The payload POSTed to the delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub user_id: String,
    pub content: String,
    pub message_id: String,
}

/// Errors from a delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The target could not be reached (connect failure, DNS, reset).
    #[error("delivery target unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete within the configured timeout.
    #[error("delivery timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The target answered with a non-2xx status.
    #[error("delivery target returned status {status}")]
    Status { status: u16 },
}

impl DeliveryError {
    /// Whether a retry can reasonably succeed.
    ///
    /// Network failures, timeouts, 5xx and 429 are transient; any other 4xx
    /// means the target rejected this message and will keep rejecting it.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout { .. } => true,
            Self::Status { status } => *status >= 500 || *status == 429,
        }
    }

    /// The HTTP status behind a permanent rejection, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

/// The downstream delivery endpoint.
///
/// Production code uses the HTTP client in `courier-adapters`; tests provide
/// recording/stalling fakes.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Deliver one message. `Ok(())` on any 2xx response.
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult<()>;
}
