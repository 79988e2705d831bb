//! HTTP client for the delivery target.
//!
//! The target is the chat-bot service's send endpoint; any 2xx response
//! counts as delivered. Everything else maps onto the transient/permanent
//! split the forwarder's retry policy is built on.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use courier_proto::{DeliveryError, DeliveryRequest, DeliveryResult, DeliveryTarget};

/// Delivery target over plain HTTP POST.
pub struct HttpDeliveryTarget {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDeliveryTarget {
    /// Build a client POSTing to `url` with a per-attempt `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> DeliveryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            timeout,
        })
    }

    fn map_error(&self, error: reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DeliveryError::Unreachable(error.to_string())
        }
    }
}

#[async_trait]
impl DeliveryTarget for HttpDeliveryTarget {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status.is_success() {
            debug!(message_id = %request.message_id, status = status.as_u16(), "delivered");
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_target_maps_to_transient_error() {
        // Port 9 (discard) is a safe dead end on any host.
        let target =
            HttpDeliveryTarget::new("http://127.0.0.1:9/send", Duration::from_millis(200))
                .unwrap();
        let request = DeliveryRequest {
            user_id: "u1".to_string(),
            content: "hello".to_string(),
            message_id: "m-1".to_string(),
        };

        let error = target.deliver(&request).await.unwrap_err();
        assert!(error.is_transient());
    }
}
