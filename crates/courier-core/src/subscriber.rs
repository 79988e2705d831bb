//! The subscriber loop: sources work from the queue, hands it to workers.
//!
//! The loop pulls batches and spawns one forwarding worker per message,
//! bounded by a semaphore so a slow target cannot pile up unbounded tasks.
//! It never inspects or transforms payloads beyond decoding the wire
//! format. Pull failures back off exponentially and retry forever — there
//! is no caller to surface them to, and the queue coming back is the only
//! fix. Shutdown stops new pulls and drains in-flight workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use courier_proto::{AckHandle, Message, QueueClient};

use crate::backoff::BackoffPolicy;
use crate::forwarder::Forwarder;

/// Pulls pending messages and dispatches them to forwarding workers.
pub struct SubscriberLoop {
    queue: Arc<dyn QueueClient>,
    forwarder: Arc<Forwarder>,
    subscription: String,
    batch_size: usize,
    concurrency: usize,
    shutdown: Arc<AtomicBool>,
    pull_backoff: BackoffPolicy,
}

impl SubscriberLoop {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        forwarder: Arc<Forwarder>,
        subscription: impl Into<String>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            forwarder,
            subscription: subscription.into(),
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            pull_backoff: BackoffPolicy::pull(),
        }
    }

    /// Replace the pull-failure backoff policy (tests use a fast one).
    pub fn with_pull_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.pull_backoff = policy;
        self
    }

    /// Flag that stops the loop after the current pull. Shared so signal
    /// handlers can flip it from outside.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until the shutdown flag is set, then drain in-flight workers.
    pub async fn run(&self) {
        info!(subscription = %self.subscription, batch = self.batch_size, workers = self.concurrency, "subscriber loop started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut pull_failures: u32 = 0;

        while !self.shutdown.load(Ordering::Relaxed) {
            let batch = match self.queue.pull(&self.subscription, self.batch_size).await {
                Ok(batch) => {
                    pull_failures = 0;
                    batch
                }
                Err(e) => {
                    pull_failures = pull_failures.saturating_add(1);
                    let delay = self.pull_backoff.delay(pull_failures);
                    warn!(
                        error = %e,
                        consecutive_failures = pull_failures,
                        delay_ms = delay.as_millis() as u64,
                        "queue pull failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            for pulled in batch {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let ack = AckHandle::new(
                    Arc::clone(&self.queue),
                    self.subscription.clone(),
                    pulled.ack_id.clone(),
                );
                let forwarder = Arc::clone(&self.forwarder);

                match Message::from_bytes(&pulled.payload) {
                    Ok(message) => {
                        workers.spawn(async move {
                            let _permit = permit;
                            forwarder.forward(message, ack).await;
                        });
                    }
                    Err(e) => {
                        warn!(ack_id = %pulled.ack_id, error = %e, "undecodable payload pulled");
                        workers.spawn(async move {
                            let _permit = permit;
                            forwarder.dead_letter_undecodable(ack).await;
                        });
                    }
                }

                // Reap finished workers without blocking the pull cadence.
                while let Some(result) = workers.try_join_next() {
                    if let Err(e) = result {
                        error!(error = %e, "forwarding worker crashed");
                    }
                }
            }
        }

        info!("subscriber loop stopping, draining in-flight workers");
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "forwarding worker crashed");
            }
        }
        info!("subscriber loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::dedup::InMemoryDedupCache;
    use crate::testing::{InMemoryQueue, MemorySink, RecordingTarget};

    fn forwarder(target: Arc<RecordingTarget>, sink: Arc<MemorySink>) -> Arc<Forwarder> {
        Arc::new(Forwarder::new(
            target,
            Arc::new(InMemoryDedupCache::new(Duration::from_secs(60), 1000)),
            sink,
            2,
            BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(2)),
        ))
    }

    fn fast_pull_backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(2))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn payload(id: &str) -> Vec<u8> {
        Message {
            id: id.to_string(),
            user_id: "u1".to_string(),
            content: "hello".to_string(),
            service: "unknown".to_string(),
            created_at: chrono::Utc::now(),
        }
        .to_bytes()
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_pulled_messages_and_stops_on_shutdown() {
        let queue = Arc::new(InMemoryQueue::new());
        let target = Arc::new(RecordingTarget::new());
        let sink = Arc::new(MemorySink::new());
        queue.publish("messages", &payload("m-1")).await.unwrap();

        let subscriber = SubscriberLoop::new(
            queue.clone(),
            forwarder(target.clone(), sink),
            "messages-sub",
            10,
            10,
        )
        .with_pull_backoff(fast_pull_backoff());
        let shutdown = subscriber.shutdown_flag();
        let handle = tokio::spawn(async move { subscriber.run().await });

        {
            let target = target.clone();
            wait_until(move || target.call_count("m-1") == 1).await;
        }
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();
        assert_eq!(queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn undecodable_payloads_are_acked_and_dead_lettered() {
        let queue = Arc::new(InMemoryQueue::new());
        let target = Arc::new(RecordingTarget::new());
        let sink = Arc::new(MemorySink::new());
        queue.publish("messages", b"not json").await.unwrap();

        let subscriber = SubscriberLoop::new(
            queue.clone(),
            forwarder(target.clone(), sink.clone()),
            "messages-sub",
            10,
            10,
        )
        .with_pull_backoff(fast_pull_backoff());
        let shutdown = subscriber.shutdown_flag();
        let handle = tokio::spawn(async move { subscriber.run().await });

        {
            let sink = sink.clone();
            wait_until(move || !sink.records().is_empty()).await;
        }
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();

        assert_eq!(target.total_calls(), 0);
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(
            sink.records()[0].reason,
            crate::dead_letter::DeadLetterReason::Undecodable
        );
    }

    #[tokio::test]
    async fn pull_failures_back_off_and_recover() {
        let queue = Arc::new(InMemoryQueue::new());
        let target = Arc::new(RecordingTarget::new());
        let sink = Arc::new(MemorySink::new());
        queue.fail_pulls(3);
        queue.publish("messages", &payload("m-1")).await.unwrap();

        let subscriber = SubscriberLoop::new(
            queue.clone(),
            forwarder(target.clone(), sink),
            "messages-sub",
            10,
            10,
        )
        .with_pull_backoff(fast_pull_backoff());
        let shutdown = subscriber.shutdown_flag();
        let handle = tokio::spawn(async move { subscriber.run().await });

        {
            let target = target.clone();
            wait_until(move || target.call_count("m-1") == 1).await;
        }
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();
    }
}
