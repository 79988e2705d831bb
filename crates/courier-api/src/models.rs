//! Request and response bodies for the ingestion API.

use serde::{Deserialize, Serialize};

/// Body of `POST /send`.
///
/// `user_id` and `content` default to empty so that missing fields surface
/// as a validation failure (400) rather than a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    /// Caller-supplied idempotency id.
    #[serde(default)]
    pub id: Option<String>,
    /// Origin service tag.
    #[serde(default)]
    pub service: Option<String>,
}

/// Successful `POST /send` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: String,
    pub message_id: String,
}

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /` banner.
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
