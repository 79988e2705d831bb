//! Forwards one in-flight message to the delivery target.
//!
//! Each message is driven through an explicit state machine rather than
//! callback chains: `Pending -> Attempting(n) -> Succeeded | DeadLettered`.
//! Every terminal state acks the queue message — delivered and deduped
//! messages because they are done, dead-lettered messages to stop
//! redelivery. The only path that leaves a message unacked is a crash,
//! which the queue's at-least-once redelivery covers.

use std::sync::Arc;

use tracing::{error, info, warn};

use courier_proto::{AckHandle, DeliveryError, DeliveryRequest, DeliveryTarget, Message};

use crate::backoff::BackoffPolicy;
use crate::dead_letter::{DeadLetterReason, DeadLetterRecord, DeadLetterSink};
use crate::dedup::DedupCache;

/// Terminal result of forwarding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The target accepted the message.
    Delivered { attempts: u32 },

    /// The id was already claimed within the dedup window; no attempt made.
    Duplicate,

    /// The message left the pipeline via the dead-letter log.
    DeadLettered { attempts: u32 },
}

enum AttemptState {
    Pending,
    Attempting(u32),
    Succeeded { attempts: u32 },
    DeadLettered { attempts: u32, reason: DeadLetterReason },
}

/// Delivers messages with dedup, bounded retry, and dead-lettering.
pub struct Forwarder {
    target: Arc<dyn DeliveryTarget>,
    dedup: Arc<dyn DedupCache>,
    dead_letters: Arc<dyn DeadLetterSink>,
    max_retries: u32,
    backoff: BackoffPolicy,
}

impl Forwarder {
    pub fn new(
        target: Arc<dyn DeliveryTarget>,
        dedup: Arc<dyn DedupCache>,
        dead_letters: Arc<dyn DeadLetterSink>,
        max_retries: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            target,
            dedup,
            dead_letters,
            max_retries,
            backoff,
        }
    }

    /// Forward one message, then resolve its queue acknowledgment.
    ///
    /// Errors local to this message never escape; the outcome is returned
    /// for observation only.
    pub async fn forward(&self, message: Message, ack: AckHandle) -> ForwardOutcome {
        let request = DeliveryRequest {
            user_id: message.user_id.clone(),
            content: message.content.clone(),
            message_id: message.id.clone(),
        };

        let mut state = AttemptState::Pending;
        loop {
            state = match state {
                AttemptState::Pending => {
                    if self.dedup.check_and_record(&message.id).await {
                        AttemptState::Attempting(1)
                    } else {
                        info!(message_id = %message.id, "duplicate redelivery suppressed");
                        self.ack_quietly(&ack, &message.id).await;
                        return ForwardOutcome::Duplicate;
                    }
                }

                AttemptState::Attempting(attempt) => match self.target.deliver(&request).await {
                    Ok(()) => AttemptState::Succeeded { attempts: attempt },
                    Err(e) if e.is_transient() && attempt <= self.max_retries => {
                        let delay = self.backoff.delay(attempt);
                        warn!(
                            message_id = %message.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "transient delivery failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        AttemptState::Attempting(attempt + 1)
                    }
                    Err(e) => AttemptState::DeadLettered {
                        attempts: attempt,
                        reason: classify_terminal(&e),
                    },
                },

                AttemptState::Succeeded { attempts } => {
                    info!(message_id = %message.id, attempts, "message delivered");
                    self.ack_quietly(&ack, &message.id).await;
                    return ForwardOutcome::Delivered { attempts };
                }

                AttemptState::DeadLettered { attempts, reason } => {
                    error!(
                        message_id = %message.id,
                        attempts,
                        reason = ?reason,
                        "message undeliverable, routing to dead-letter log"
                    );
                    self.record_dead_letter(&message, attempts, reason).await;
                    self.ack_quietly(&ack, &message.id).await;
                    return ForwardOutcome::DeadLettered { attempts };
                }
            };
        }
    }

    /// Record a message the subscriber could not even decode.
    pub async fn dead_letter_undecodable(&self, ack: AckHandle) {
        error!(ack_id = %ack.ack_id(), "undecodable queue payload, routing to dead-letter log");
        let record = DeadLetterRecord {
            ts: chrono::Utc::now(),
            message_id: "unknown".to_string(),
            user_id: "unknown".to_string(),
            attempts: 0,
            reason: DeadLetterReason::Undecodable,
        };
        if let Err(e) = self.dead_letters.record(&record).await {
            error!(error = %e, "failed to persist dead-letter record");
        }
        self.ack_quietly(&ack, "unknown").await;
    }

    async fn record_dead_letter(&self, message: &Message, attempts: u32, reason: DeadLetterReason) {
        let record = DeadLetterRecord {
            ts: chrono::Utc::now(),
            message_id: message.id.clone(),
            user_id: message.user_id.clone(),
            attempts,
            reason,
        };
        if let Err(e) = self.dead_letters.record(&record).await {
            error!(message_id = %message.id, error = %e, "failed to persist dead-letter record");
        }
    }

    /// Ack, logging failure instead of propagating it: an unacked message
    /// simply becomes eligible for redelivery, which the dedup cache makes
    /// safe.
    async fn ack_quietly(&self, ack: &AckHandle, message_id: &str) {
        if let Err(e) = ack.ack().await {
            warn!(message_id = %message_id, error = %e, "ack failed; queue will redeliver");
        }
    }
}

fn classify_terminal(error: &DeliveryError) -> DeadLetterReason {
    if error.is_transient() {
        DeadLetterReason::RetriesExhausted
    } else {
        DeadLetterReason::Rejected {
            status: error.status().unwrap_or(0),
        }
    }
}
