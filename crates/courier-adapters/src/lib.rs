//! # courier-adapters
//!
//! Adapters binding the relay's trait seams to real external systems:
//!
//! - [`HttpQueueClient`] — the durable queue over its Pub/Sub-style REST
//!   protocol (publish, long-poll pull, acknowledge, deadline-reset nack)
//! - [`HttpDeliveryTarget`] — the chat-bot delivery endpoint over plain
//!   HTTP POST with a per-attempt timeout

mod http_target;
mod queue_http;

pub use http_target::HttpDeliveryTarget;
pub use queue_http::HttpQueueClient;
