//! Delivered messages
//!
//! A `ReceivedMessage` is what a broker hands to a subscriber: the raw bytes
//! published to the topic plus a one-shot acknowledgment capability. Both
//! `ack` and `nack` consume the handle, so a message can be resolved at most
//! once.

use std::fmt;

use chrono::{DateTime, Utc};

/// Broker-side acknowledgment hooks for a single delivery.
pub trait Acker: Send {
    /// Marks the delivery as processed; the broker will not redeliver it.
    fn ack(self: Box<Self>);

    /// Rejects the delivery; the broker redelivers it per its retry policy.
    fn nack(self: Box<Self>);
}

/// Owned acknowledgment capability detached from the message payload.
pub struct AckHandle {
    inner: Box<dyn Acker>,
}

impl AckHandle {
    pub fn new(inner: Box<dyn Acker>) -> Self {
        Self { inner }
    }

    pub fn ack(self) {
        self.inner.ack();
    }

    pub fn nack(self) {
        self.inner.nack();
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle").finish_non_exhaustive()
    }
}

/// A single delivery from a subscription.
#[derive(Debug)]
pub struct ReceivedMessage {
    /// Broker-assigned message id, shared by every subscription of the topic.
    pub id: String,
    /// Opaque payload as published.
    pub data: Vec<u8>,
    /// 1 for the first delivery, incremented on every redelivery.
    pub delivery_attempt: u32,
    pub publish_time: DateTime<Utc>,
    pub ack: AckHandle,
}

impl ReceivedMessage {
    pub fn new(
        id: impl Into<String>,
        data: Vec<u8>,
        delivery_attempt: u32,
        publish_time: DateTime<Utc>,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            delivery_attempt,
            publish_time,
            ack: AckHandle::new(acker),
        }
    }
}
