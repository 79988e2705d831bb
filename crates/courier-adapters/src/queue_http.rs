//! HTTP adapter for the durable queue.
//!
//! Speaks the Pub/Sub-style REST protocol against a configurable base URL
//! (the managed service or a local emulator). Resource names follow the
//! `projects/{project}/topics/{topic}` scheme; message data travels
//! base64-encoded. Nack is expressed as resetting the ack deadline to
//! zero, which makes the message immediately eligible for redelivery.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use courier_proto::{PulledMessage, QueueClient, QueueError, QueueResult};

/// Extra slack on top of the server-side long-poll budget.
const PULL_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Queue client over the broker's REST API.
pub struct HttpQueueClient {
    http: reqwest::Client,
    pull_http: reqwest::Client,
    base_url: String,
    project: String,
}

impl HttpQueueClient {
    /// Build a client against `base_url` (no trailing slash required).
    ///
    /// `request_timeout` bounds publish/ack/check calls; `pull_timeout` is
    /// the long-poll budget, enforced client-side with a small margin.
    pub fn new(
        base_url: impl Into<String>,
        project: impl Into<String>,
        request_timeout: Duration,
        pull_timeout: Duration,
    ) -> QueueResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;
        let pull_http = reqwest::Client::builder()
            .timeout(pull_timeout + PULL_TIMEOUT_MARGIN)
            .build()
            .map_err(|e| QueueError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            pull_http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
        })
    }

    fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.project, topic)
    }

    fn subscription_path(&self, subscription: &str) -> String {
        format!("projects/{}/subscriptions/{}", self.project, subscription)
    }

    fn url(&self, resource: &str, verb: &str) -> String {
        format!("{}/v1/{resource}:{verb}", self.base_url)
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        client: &reqwest::Client,
        url: &str,
        body: &B,
    ) -> QueueResult<R> {
        let response = client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                detail: truncate(&detail, 256),
            });
        }
        response
            .json()
            .await
            .map_err(|e| QueueError::Malformed(e.to_string()))
    }
}

fn map_transport_error(error: reqwest::Error) -> QueueError {
    QueueError::Unreachable(error.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PublishBody {
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct WireMessage {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullBody {
    max_messages: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: ReceivedPayload,
}

#[derive(Deserialize)]
struct ReceivedPayload {
    #[serde(default)]
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AckBody {
    ack_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyDeadlineBody {
    ack_ids: Vec<String>,
    ack_deadline_seconds: u32,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<String> {
        let url = self.url(&self.topic_path(topic), "publish");
        let body = PublishBody {
            messages: vec![WireMessage {
                data: BASE64.encode(payload),
            }],
        };
        let response: PublishResponse = self.post_json(&self.http, &url, &body).await?;
        response
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Malformed("publish response carried no message id".into()))
    }

    async fn pull(&self, subscription: &str, max: usize) -> QueueResult<Vec<PulledMessage>> {
        let url = self.url(&self.subscription_path(subscription), "pull");
        let body = PullBody { max_messages: max };
        let response: PullResponse = self.post_json(&self.pull_http, &url, &body).await?;

        let mut batch = Vec::with_capacity(response.received_messages.len());
        for received in response.received_messages {
            let payload = BASE64
                .decode(received.message.data.as_bytes())
                .map_err(|e| QueueError::Malformed(format!("invalid base64 payload: {e}")))?;
            batch.push(PulledMessage {
                ack_id: received.ack_id,
                payload,
            });
        }
        debug!(subscription = %subscription, count = batch.len(), "pulled batch");
        Ok(batch)
    }

    async fn ack(&self, subscription: &str, ack_id: &str) -> QueueResult<()> {
        let url = self.url(&self.subscription_path(subscription), "acknowledge");
        let body = AckBody {
            ack_ids: vec![ack_id.to_string()],
        };
        let _: Empty = self.post_json(&self.http, &url, &body).await?;
        Ok(())
    }

    async fn nack(&self, subscription: &str, ack_id: &str) -> QueueResult<()> {
        let url = self.url(&self.subscription_path(subscription), "modifyAckDeadline");
        let body = ModifyDeadlineBody {
            ack_ids: vec![ack_id.to_string()],
            ack_deadline_seconds: 0,
        };
        let _: Empty = self.post_json(&self.http, &url, &body).await?;
        Ok(())
    }

    async fn check(&self) -> QueueResult<()> {
        // Fetching the topic list is the cheapest authenticated round-trip
        // that proves the publish path is reachable.
        let url = format!("{}/v1/projects/{}/topics", self.base_url, self.project);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                detail: "topic listing failed".to_string(),
            });
        }
        Ok(())
    }
}
