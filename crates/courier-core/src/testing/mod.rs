//! In-memory test doubles for the relay's external collaborators.
//!
//! These live in the library (not behind `#[cfg(test)]`) so downstream
//! crates can drive the relay in their own tests: an [`InMemoryQueue`]
//! with real pull/ack/redelivery semantics, a [`RecordingTarget`] that can
//! be scripted to fail or stall per message, and a [`MemorySink`] that
//! captures dead-letter records.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use courier_proto::{
    DeliveryError, DeliveryRequest, DeliveryResult, DeliveryTarget, PulledMessage, QueueClient,
    QueueError, QueueResult,
};

use crate::dead_letter::{DeadLetterError, DeadLetterRecord, DeadLetterSink};

/// An in-memory queue with pull/ack semantics and scriptable failures.
///
/// Published payloads land in a pending list; `pull` moves them in-flight;
/// `ack` drops them; `nack` (and [`InMemoryQueue::redeliver_all`]) puts
/// them back. Topic and subscription names are accepted but not routed —
/// the fake models one topic with one subscription, which is all the relay
/// uses.
#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<QueuedEntry>>,
    in_flight: Mutex<HashMap<String, QueuedEntry>>,
    next_id: AtomicU64,
    publish_failures: AtomicU64,
    pull_failures: AtomicU64,
    check_fails: Mutex<bool>,
}

#[derive(Clone)]
struct QueuedEntry {
    ack_id: String,
    payload: Vec<u8>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail as unreachable.
    pub fn fail_publishes(&self, n: u64) {
        self.publish_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` pulls fail as unreachable.
    pub fn fail_pulls(&self, n: u64) {
        self.pull_failures.store(n, Ordering::SeqCst);
    }

    /// Make `check` report the queue as unreachable.
    pub fn fail_checks(&self, failing: bool) {
        *self.check_fails.lock().unwrap() = failing;
    }

    /// Messages waiting to be pulled.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Messages pulled but not yet acked.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Simulate ack-deadline expiry: every unacked message becomes
    /// pullable again with a fresh ack id.
    pub fn redeliver_all(&self) {
        // Locks are taken one at a time; `pull` holds both in the other
        // order.
        let drained: Vec<QueuedEntry> = self.in_flight.lock().unwrap().drain().map(|(_, e)| e).collect();
        let mut pending = self.pending.lock().unwrap();
        for mut entry in drained {
            entry.ack_id = format!("redelivery-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            pending.push_back(entry);
        }
    }

    fn take_failure(counter: &AtomicU64) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn publish(&self, _topic: &str, payload: &[u8]) -> QueueResult<String> {
        if Self::take_failure(&self.publish_failures) {
            return Err(QueueError::Unreachable("simulated publish failure".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().push_back(QueuedEntry {
            ack_id: format!("ack-{id}"),
            payload: payload.to_vec(),
        });
        Ok(format!("queue-{id}"))
    }

    async fn pull(&self, _subscription: &str, max: usize) -> QueueResult<Vec<PulledMessage>> {
        if Self::take_failure(&self.pull_failures) {
            return Err(QueueError::Unreachable("simulated pull failure".into()));
        }
        let batch = {
            let mut pending = self.pending.lock().unwrap();
            let mut in_flight = self.in_flight.lock().unwrap();
            let mut batch = Vec::new();
            while batch.len() < max {
                let Some(entry) = pending.pop_front() else {
                    break;
                };
                batch.push(PulledMessage {
                    ack_id: entry.ack_id.clone(),
                    payload: entry.payload.clone(),
                });
                in_flight.insert(entry.ack_id.clone(), entry);
            }
            batch
        };
        if batch.is_empty() {
            // Mimic a long poll returning empty without spinning the caller.
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        Ok(batch)
    }

    async fn ack(&self, _subscription: &str, ack_id: &str) -> QueueResult<()> {
        self.in_flight.lock().unwrap().remove(ack_id);
        Ok(())
    }

    async fn nack(&self, _subscription: &str, ack_id: &str) -> QueueResult<()> {
        let entry = self.in_flight.lock().unwrap().remove(ack_id);
        if let Some(entry) = entry {
            self.pending.lock().unwrap().push_back(entry);
        }
        Ok(())
    }

    async fn check(&self) -> QueueResult<()> {
        if *self.check_fails.lock().unwrap() {
            return Err(QueueError::Unreachable("simulated check failure".into()));
        }
        Ok(())
    }
}

/// A delivery target that records every call and can be scripted per id.
#[derive(Default)]
pub struct RecordingTarget {
    calls: Mutex<Vec<DeliveryRequest>>,
    failures: Mutex<HashMap<String, Scripted>>,
    stalls: Mutex<HashMap<String, Arc<Notify>>>,
}

struct Scripted {
    remaining: u32,
    status: u16,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `status` to the next `n` deliveries of `message_id`.
    pub fn fail_times(&self, message_id: &str, n: u32, status: u16) {
        self.failures.lock().unwrap().insert(
            message_id.to_string(),
            Scripted {
                remaining: n,
                status,
            },
        );
    }

    /// Hold deliveries of `message_id` until [`RecordingTarget::release`].
    pub fn stall(&self, message_id: &str) {
        self.stalls
            .lock()
            .unwrap()
            .insert(message_id.to_string(), Arc::new(Notify::new()));
    }

    /// Release one stalled delivery of `message_id`.
    pub fn release(&self, message_id: &str) {
        if let Some(gate) = self.stalls.lock().unwrap().get(message_id) {
            gate.notify_one();
        }
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<DeliveryRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Deliveries seen for one message id.
    pub fn call_count(&self, message_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.message_id == message_id)
            .count()
    }

    /// Deliveries seen across all ids.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryTarget for RecordingTarget {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult<()> {
        self.calls.lock().unwrap().push(request.clone());

        let gate = self
            .stalls
            .lock()
            .unwrap()
            .get(&request.message_id)
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(scripted) = failures.get_mut(&request.message_id)
            && scripted.remaining > 0
        {
            scripted.remaining = scripted.remaining.saturating_sub(1);
            return Err(DeliveryError::Status {
                status: scripted.status,
            });
        }
        Ok(())
    }
}

/// Captures dead-letter records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<DeadLetterRecord>>,
    fail_next: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next record call fail with an io error.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Every record captured so far.
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemorySink {
    async fn record(&self, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(DeadLetterError::Io(std::io::Error::other(
                "simulated sink failure",
            )));
        }
        drop(fail);
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
