//! Courier relay service - binary entry point.
//!
//! Wires the HTTP adapters into the relay core, spawns the subscriber
//! loop, and serves the ingestion API until shutdown. The subscriber is
//! stopped and drained after the HTTP server exits so no in-flight
//! acknowledgment is lost.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier_adapters::{HttpDeliveryTarget, HttpQueueClient};
use courier_api::health::HealthState;
use courier_api::{AppState, serve};
use courier_core::{
    BackoffPolicy, DeadLetterLog, Forwarder, InMemoryDedupCache, Publisher, RelayConfig,
    SubscriberLoop,
};
use courier_proto::QueueClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier_api=info,courier_core=info,courier_adapters=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::load().context("failed to load configuration")?;

    let queue: Arc<dyn QueueClient> = Arc::new(HttpQueueClient::new(
        &config.queue_base_url,
        &config.project,
        std::time::Duration::from_secs(10),
        config.pull_timeout(),
    )?);

    // An unreachable queue at startup is fatal; at runtime the subscriber
    // loop rides out outages with backoff instead.
    queue
        .check()
        .await
        .with_context(|| format!("queue at {} is not reachable", config.queue_base_url))?;

    let target = Arc::new(HttpDeliveryTarget::new(
        &config.delivery_target_url,
        config.delivery_timeout(),
    )?);
    let dedup = Arc::new(InMemoryDedupCache::new(
        config.dedup_retention(),
        config.dedup_max_entries,
    ));
    let dead_letters = Arc::new(DeadLetterLog::new(&config.dead_letter_path));

    let forwarder = Arc::new(Forwarder::new(
        target,
        dedup,
        dead_letters,
        config.max_retries,
        BackoffPolicy::delivery(),
    ));
    let subscriber = SubscriberLoop::new(
        Arc::clone(&queue),
        forwarder,
        &config.subscription,
        config.pull_batch_size,
        config.effective_concurrency(),
    );
    let shutdown = subscriber.shutdown_flag();
    let subscriber_handle = tokio::spawn(async move { subscriber.run().await });

    let state = AppState {
        publisher: Arc::new(Publisher::new(Arc::clone(&queue), &config.topic)),
        health: Arc::new(HealthState::new(queue)),
    };

    serve(config.port, state).await?;

    // HTTP server exited on a shutdown signal: stop pulling, drain workers.
    shutdown.store(true, Ordering::Relaxed);
    subscriber_handle
        .await
        .context("subscriber loop panicked")?;

    Ok(())
}
