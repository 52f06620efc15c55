//! The `broker` module is the boundary to the external topic/subscription
//! broker.
//!
//! It defines the narrow capability interface the transport consumes
//! (`BrokerClient`, `BrokerConnector`), the delivered-message type with its
//! one-shot ack/nack capability, and an in-memory engine implementing the
//! interface for local runs and tests.

pub mod client;
pub mod engine;
pub mod message;
pub mod topic;

pub use client::{
    BrokerClient, BrokerConnector, BrokerError, ConnectionSettings, MessageStream, ResourceKind,
    SubscriptionHandle, SubscriptionMetadata, SubscriptionOptions,
};
pub use engine::{DELETED_TOPIC, InMemoryBroker, SubscriptionStats};
pub use message::{AckHandle, Acker, ReceivedMessage};
