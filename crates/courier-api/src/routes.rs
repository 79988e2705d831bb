//! API routes for the ingestion surface.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::error;

use courier_core::MessageSubmission;
use courier_proto::MAX_CONTENT_BYTES;

use crate::AppState;
use crate::models::{ErrorResponse, HealthResponse, RootResponse, SendRequest, SendResponse};

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/send", post(send))
        .route("/health", get(health))
        .with_state(state)
}

/// Service banner.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Courier relay is running".to_string(),
    })
}

/// Liveness probe: healthy only when the publish path is reachable.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.health.healthy().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
            }),
        )
    }
}

/// Accept a message submission and publish it to the queue.
///
/// Returns 202 with the assigned id once the queue has confirmed
/// acceptance. Validation failures never reach the publisher.
async fn send(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<SendResponse>), (StatusCode, Json<ErrorResponse>)> {
    if let Err(reason) = validate(&request) {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })));
    }

    let submission = MessageSubmission {
        user_id: request.user_id,
        content: request.content,
        id: request.id,
        service: request.service,
    };

    match state.publisher.publish(submission).await {
        Ok(message_id) => {
            state.health.record_success();
            Ok((
                StatusCode::ACCEPTED,
                Json(SendResponse {
                    status: "sent".to_string(),
                    message_id,
                }),
            ))
        }
        Err(e) => {
            state.health.record_failure();
            error!(error = %e, "publish failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

fn validate(request: &SendRequest) -> Result<(), String> {
    if request.user_id.trim().is_empty() {
        return Err("user_id must not be empty".to_string());
    }
    if request.content.is_empty() {
        return Err("content must not be empty".to_string());
    }
    if request.content.len() > MAX_CONTENT_BYTES {
        return Err(format!("content exceeds {MAX_CONTENT_BYTES} bytes"));
    }
    if let Some(id) = &request.id
        && id.trim().is_empty()
    {
        return Err("id must not be empty when supplied".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_a_normal_submission() {
        let request = SendRequest {
            user_id: "u1".to_string(),
            content: "hello".to_string(),
            id: None,
            service: None,
        };
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields_and_oversized_content() {
        let empty_user = SendRequest {
            user_id: "  ".to_string(),
            content: "hello".to_string(),
            id: None,
            service: None,
        };
        assert!(validate(&empty_user).is_err());

        let empty_content = SendRequest {
            user_id: "u1".to_string(),
            content: String::new(),
            id: None,
            service: None,
        };
        assert!(validate(&empty_content).is_err());

        let oversized = SendRequest {
            user_id: "u1".to_string(),
            content: "x".repeat(MAX_CONTENT_BYTES + 1),
            id: None,
            service: None,
        };
        assert!(validate(&oversized).is_err());

        let blank_id = SendRequest {
            user_id: "u1".to_string(),
            content: "hello".to_string(),
            id: Some(String::new()),
            service: None,
        };
        assert!(validate(&blank_id).is_err());
    }

    #[test]
    fn validate_allows_content_at_the_size_bound() {
        let request = SendRequest {
            user_id: "u1".to_string(),
            content: "x".repeat(MAX_CONTENT_BYTES),
            id: None,
            service: None,
        };
        assert!(validate(&request).is_ok());
    }
}
