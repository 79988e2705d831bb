//! # courier-proto
//!
//! Shared types, error definitions, and traits for the Courier message relay.
//!
//! This crate provides the foundational abstractions used across all Courier
//! crates, including:
//! - The [`Message`] wire model and its size bounds
//! - The [`QueueClient`] trait for the durable queue's publish/pull/ack
//!   primitives, plus the [`AckHandle`] passed to forwarding workers
//! - The [`DeliveryTarget`] trait for the downstream chat-bot endpoint

mod delivery;
mod message;
mod queue;

pub use delivery::{DeliveryError, DeliveryRequest, DeliveryResult, DeliveryTarget};
pub use message::{MAX_CONTENT_BYTES, Message};
pub use queue::{AckHandle, PulledMessage, QueueClient, QueueError, QueueResult};
