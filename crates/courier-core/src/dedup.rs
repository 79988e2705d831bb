//! Bounded, time-windowed deduplication cache.
//!
//! The cache is the only state shared between forwarding workers. Its single
//! capability is an atomic `check_and_record`: the first caller for an id
//! within the retention window wins, every later caller is told it lost.
//! Entries expire after the retention window or when the cache exceeds its
//! capacity, least-recently-recorded first.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Capability the forwarder needs from a dedup store.
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Record `id` if it is not already present.
    ///
    /// Returns `true` when the id was newly recorded (caller owns the
    /// forward) and `false` when the id is a duplicate within the window.
    /// Check and record are one atomic step.
    async fn check_and_record(&self, id: &str) -> bool;
}

/// In-memory dedup cache with retention-window expiry and a capacity cap.
pub struct InMemoryDedupCache {
    retention: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Recording time per id.
    entries: HashMap<String, Instant>,
    /// Ids in recording order; front is always the oldest live entry.
    order: VecDeque<String>,
}

impl InMemoryDedupCache {
    /// Create a cache with the given retention window and capacity.
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            retention,
            max_entries: max_entries.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Number of live entries (expired-but-not-yet-swept entries count).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    fn sweep_expired(&self, inner: &mut Inner, now: Instant) {
        while let Some(oldest) = inner.order.front() {
            let expired = inner
                .entries
                .get(oldest)
                .is_some_and(|recorded| now.duration_since(*recorded) >= self.retention);
            if !expired {
                break;
            }
            let id = inner.order.pop_front().unwrap_or_default();
            inner.entries.remove(&id);
        }
    }
}

#[async_trait]
impl DedupCache for InMemoryDedupCache {
    async fn check_and_record(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        self.sweep_expired(&mut inner, now);

        if inner.entries.contains_key(id) {
            return false;
        }

        inner.entries.insert(id.to_string(), now);
        inner.order.push_back(id.to_string());

        while inner.entries.len() > self.max_entries {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        true
    }
}
