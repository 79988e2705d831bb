//! # courier-core
//!
//! The relay core for Courier.
//!
//! This crate provides:
//! - The publisher that turns accepted submissions into queued messages
//! - The subscriber loop that sources work from the queue
//! - The forwarder that delivers messages with retry, backoff, and dedup
//! - The bounded, time-windowed dedup cache
//! - The dead-letter log for undeliverable messages
//! - Configuration loading and management
//!
//! Everything network-facing hides behind the traits in `courier-proto`;
//! the [`testing`] module ships in-memory implementations for all of them.

mod backoff;
mod config;
mod dead_letter;
mod dedup;
mod forwarder;
mod publisher;
mod subscriber;
pub mod testing;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, RelayConfig};
pub use dead_letter::{DeadLetterError, DeadLetterLog, DeadLetterReason, DeadLetterRecord, DeadLetterSink};
pub use dedup::{DedupCache, InMemoryDedupCache};
pub use forwarder::{ForwardOutcome, Forwarder};
pub use publisher::{MessageSubmission, PublishError, Publisher};
pub use subscriber::SubscriberLoop;
