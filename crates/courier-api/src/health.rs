//! Cached queue reachability for the liveness probe.
//!
//! `/health` must report whether the publish path works without publishing
//! on every call. The state caches the most recent verdict — fed by real
//! publish outcomes from `/send` — and falls back to the queue's
//! lightweight `check` probe when the cached verdict has gone stale.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use courier_proto::QueueClient;
use tracing::warn;

/// How long a cached verdict stays authoritative.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Shared health state for the ingestion API.
pub struct HealthState {
    queue: Arc<dyn QueueClient>,
    ttl: Duration,
    last: Mutex<Option<Verdict>>,
}

#[derive(Clone, Copy)]
struct Verdict {
    healthy: bool,
    at: Instant,
}

impl HealthState {
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        Self::with_ttl(queue, DEFAULT_TTL)
    }

    pub fn with_ttl(queue: Arc<dyn QueueClient>, ttl: Duration) -> Self {
        Self {
            queue,
            ttl,
            last: Mutex::new(None),
        }
    }

    /// Record a successful publish observed on the send path.
    pub fn record_success(&self) {
        self.record(true);
    }

    /// Record a failed publish observed on the send path.
    pub fn record_failure(&self) {
        self.record(false);
    }

    fn record(&self, healthy: bool) {
        *self.last.lock().unwrap() = Some(Verdict {
            healthy,
            at: Instant::now(),
        });
    }

    /// Current verdict, probing the queue only when the cache is stale.
    pub async fn healthy(&self) -> bool {
        let cached = *self.last.lock().unwrap();
        if let Some(verdict) = cached
            && verdict.at.elapsed() < self.ttl
        {
            return verdict.healthy;
        }

        let healthy = match self.queue.check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "queue health probe failed");
                false
            }
        };
        self.record(healthy);
        healthy
    }
}
