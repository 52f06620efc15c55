//! Ack/dispatch pipeline
//!
//! Runs once per delivered message: decode the envelope, look up the handler
//! for its pattern, invoke it, and resolve the message's ack capability
//! exactly once. When the ack happens depends on the [`AckPolicy`]:
//!
//! - `Immediate`: ack on receipt, before decoding. Nothing after that can
//!   cause a redelivery; decode, routing and handler failures are logged.
//! - `AfterHandler`: ack only once the handler succeeded. A failing handler
//!   nacks the message so the broker redelivers it. Malformed and unroutable
//!   messages are nacked too, handing them to the broker's retry and
//!   dead-letter policy instead of waiting for the ack deadline.
//!
//! Handler failures (errors and panics) never escape `process`; they are
//! reported in the returned [`DispatchOutcome`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Value, json};

use crate::broker::{AckHandle, ReceivedMessage};
use crate::transport::envelope;
use crate::transport::registry::HandlerRegistry;
use crate::utils::{HandlerError, TransportLogger};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Ack as soon as the message is received.
    #[default]
    Immediate,
    /// Ack after the handler succeeds, nack otherwise.
    AfterHandler,
}

impl AckPolicy {
    pub fn from_ack_after_handler(ack_after_handler: bool) -> Self {
        if ack_after_handler {
            AckPolicy::AfterHandler
        } else {
            AckPolicy::Immediate
        }
    }
}

/// What happened to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Handled(Value),
    HandlerFailed(HandlerError),
    Malformed,
    Unroutable { pattern: String },
}

#[derive(Clone)]
pub struct AckDispatchPipeline {
    registry: Arc<HandlerRegistry>,
    policy: AckPolicy,
    logger: Arc<dyn TransportLogger>,
}

impl AckDispatchPipeline {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        policy: AckPolicy,
        logger: Arc<dyn TransportLogger>,
    ) -> Self {
        Self {
            registry,
            policy,
            logger,
        }
    }

    pub async fn process(&self, message: ReceivedMessage, subscription: &str) -> DispatchOutcome {
        let ReceivedMessage { id, data, ack, .. } = message;

        let pending = match self.policy {
            AckPolicy::Immediate => {
                ack.ack();
                None
            }
            AckPolicy::AfterHandler => Some(ack),
        };

        let Some(envelope) = envelope::decode(&data) else {
            self.logger.error(
                &format!("invalid message received ({subscription})"),
                json!({
                    "raw_data": String::from_utf8_lossy(&data),
                    "subscription": subscription,
                    "message_id": &id,
                }),
            );
            reject(pending);
            return DispatchOutcome::Malformed;
        };

        let envelope::MessageEnvelope { pattern, data } = envelope;
        let Some(handler) = self.registry.lookup(&pattern) else {
            self.logger.error(
                &format!("no handler exists for \"{pattern}\""),
                json!({ "pattern": &pattern, "subscription": subscription, "message_id": &id }),
            );
            reject(pending);
            return DispatchOutcome::Unroutable { pattern };
        };

        // The call itself runs inside the guard so a handler that panics
        // before returning its future is caught too.
        let invocation = async move { (*handler)(data).await };
        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::new(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match result {
            Ok(value) => {
                if let Some(ack) = pending {
                    ack.ack();
                }
                DispatchOutcome::Handled(value)
            }
            Err(error) => {
                self.logger.error(
                    &format!("error from the handler of \"{pattern}\""),
                    json!({
                        "error": error.message(),
                        "pattern": &pattern,
                        "subscription": subscription,
                        "message_id": &id,
                    }),
                );
                reject(pending);
                DispatchOutcome::HandlerFailed(error)
            }
        }
    }
}

fn reject(pending: Option<AckHandle>) {
    if let Some(ack) = pending {
        ack.nack();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
