//! End-to-end relay tests over the in-memory collaborators: publisher in,
//! subscriber loop + forwarder out, real dedup cache in between.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use courier_core::testing::{InMemoryQueue, MemorySink, RecordingTarget};
use courier_core::{
    BackoffPolicy, DeadLetterReason, Forwarder, InMemoryDedupCache, MessageSubmission, Publisher,
    SubscriberLoop,
};

struct Relay {
    queue: Arc<InMemoryQueue>,
    target: Arc<RecordingTarget>,
    sink: Arc<MemorySink>,
    publisher: Publisher,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl Relay {
    /// Start a full relay over in-memory collaborators.
    fn start(max_retries: u32) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let target = Arc::new(RecordingTarget::new());
        let sink = Arc::new(MemorySink::new());

        let forwarder = Arc::new(Forwarder::new(
            target.clone(),
            Arc::new(InMemoryDedupCache::new(Duration::from_secs(60), 1000)),
            sink.clone(),
            max_retries,
            BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(2)),
        ));
        let subscriber = SubscriberLoop::new(queue.clone(), forwarder, "messages-sub", 10, 10)
            .with_pull_backoff(BackoffPolicy::new(
                Duration::from_millis(1),
                Duration::from_millis(2),
            ));
        let shutdown = subscriber.shutdown_flag();
        let handle = tokio::spawn(async move { subscriber.run().await });

        Self {
            publisher: Publisher::new(queue.clone(), "messages"),
            queue,
            target,
            sink,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle.await.unwrap();
    }
}

fn submission(user_id: &str, content: &str) -> MessageSubmission {
    MessageSubmission {
        user_id: user_id.to_string(),
        content: content.to_string(),
        ..Default::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn accepted_message_reaches_the_target_exactly_once() {
    let relay = Relay::start(5);

    let id = relay
        .publisher
        .publish(submission("u1", "hello"))
        .await
        .unwrap();

    {
        let target = relay.target.clone();
        let id = id.clone();
        wait_until(move || target.call_count(&id) == 1).await;
    }

    let calls = relay.target.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user_id, "u1");
    assert_eq!(calls[0].content, "hello");
    assert_eq!(calls[0].message_id, id);

    // Settled: acked, nothing pending, nothing dead-lettered.
    wait_until({
        let queue = relay.queue.clone();
        move || queue.in_flight_len() == 0
    })
    .await;
    assert_eq!(relay.queue.pending_len(), 0);
    assert!(relay.sink.records().is_empty());

    relay.stop().await;
}

#[tokio::test]
async fn redelivery_overlapping_an_in_flight_attempt_is_suppressed() {
    let relay = Relay::start(5);
    relay.target.stall("dup");

    relay
        .publisher
        .publish(MessageSubmission {
            id: Some("dup".to_string()),
            ..submission("u1", "hello")
        })
        .await
        .unwrap();

    // First attempt is mid-call against the target, unacked.
    {
        let target = relay.target.clone();
        wait_until(move || target.call_count("dup") == 1).await;
    }

    // Ack deadline expires: the queue redelivers while the first attempt
    // is still in flight. The copy must drain without a second call.
    relay.queue.redeliver_all();
    wait_until({
        let queue = relay.queue.clone();
        move || queue.pending_len() == 0 && queue.in_flight_len() == 0
    })
    .await;
    assert_eq!(relay.target.call_count("dup"), 1);

    relay.target.release("dup");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(relay.target.call_count("dup"), 1);

    relay.stop().await;
}

#[tokio::test]
async fn duplicate_submission_with_same_id_forwards_once() {
    let relay = Relay::start(5);

    for _ in 0..2 {
        relay
            .publisher
            .publish(MessageSubmission {
                id: Some("same-key".to_string()),
                ..submission("u1", "hello")
            })
            .await
            .unwrap();
    }

    wait_until({
        let queue = relay.queue.clone();
        move || queue.pending_len() == 0 && queue.in_flight_len() == 0
    })
    .await;
    assert_eq!(relay.target.call_count("same-key"), 1);

    relay.stop().await;
}

#[tokio::test]
async fn always_failing_target_is_attempted_max_retries_plus_one_times() {
    let relay = Relay::start(5);
    relay.target.fail_times("doomed", u32::MAX, 500);

    let id = relay
        .publisher
        .publish(MessageSubmission {
            user_id: "u1".to_string(),
            content: "hello".to_string(),
            id: Some("doomed".to_string()),
            service: None,
        })
        .await
        .unwrap();
    assert_eq!(id, "doomed");

    {
        let sink = relay.sink.clone();
        wait_until(move || !sink.records().is_empty()).await;
    }

    // Give any extra (incorrect) attempt a chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(relay.target.call_count("doomed"), 6);

    let records = relay.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message_id, "doomed");
    assert_eq!(records[0].attempts, 6);
    assert_eq!(records[0].reason, DeadLetterReason::RetriesExhausted);

    // Dead-lettered messages are acked, never redelivered.
    assert_eq!(relay.queue.in_flight_len(), 0);
    assert_eq!(relay.queue.pending_len(), 0);

    relay.stop().await;
}

#[tokio::test]
async fn stalled_message_does_not_block_batch_siblings() {
    let relay = Relay::start(5);
    relay.target.stall("slow");

    relay
        .publisher
        .publish(MessageSubmission {
            id: Some("slow".to_string()),
            ..submission("u1", "stuck")
        })
        .await
        .unwrap();
    relay
        .publisher
        .publish(MessageSubmission {
            id: Some("fast".to_string()),
            ..submission("u2", "quick")
        })
        .await
        .unwrap();

    // The fast sibling settles while the slow one is still held mid-call.
    wait_until({
        let target = relay.target.clone();
        let queue = relay.queue.clone();
        move || {
            target.call_count("fast") == 1
                && target.call_count("slow") == 1
                && queue.in_flight_len() == 1
        }
    })
    .await;

    relay.target.release("slow");
    wait_until({
        let queue = relay.queue.clone();
        move || queue.in_flight_len() == 0
    })
    .await;
    assert_eq!(relay.target.call_count("slow"), 1);

    relay.stop().await;
}

#[tokio::test]
async fn relay_recovers_after_transient_pull_outage() {
    let relay = Relay::start(5);
    relay.queue.fail_pulls(4);

    let id = relay
        .publisher
        .publish(submission("u1", "hello"))
        .await
        .unwrap();

    {
        let target = relay.target.clone();
        let id = id.clone();
        wait_until(move || target.call_count(&id) == 1).await;
    }

    relay.stop().await;
}
