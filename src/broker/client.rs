//! Broker capability interface
//!
//! The transport never talks to a concrete broker SDK. Everything it needs
//! (topic and subscription creation, metadata lookup, streaming delivery,
//! publishing and teardown) goes through [`BrokerClient`], and outbound
//! connections are established through [`BrokerConnector`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::broker::message::ReceivedMessage;

/// Stream of deliveries for one subscription. Ends when the subscription is closed.
pub type MessageStream = UnboundedReceiver<ReceivedMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Topic,
    Subscription,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Topic => f.write_str("topic"),
            ResourceKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Errors reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("broker client is closed")]
    Closed,

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// True when a create call failed only because the resource is already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BrokerError::AlreadyExists { .. })
    }
}

/// Local reference to a broker subscription. Holding one does not imply the
/// subscription exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    name: String,
}

impl SubscriptionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Broker-side view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionMetadata {
    pub name: String,
    /// Bound topic, usually fully qualified (`projects/<project>/topics/<topic>`).
    pub topic: String,
}

/// Delivery settings applied when a subscription is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// How long a delivery may stay unresolved before it is redelivered.
    /// `None` waits indefinitely.
    pub ack_deadline: Option<Duration>,
    pub max_delivery_attempts: Option<u32>,
    pub dead_letter_topic: Option<String>,
}

/// Connection target for outbound clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub project_id: Option<String>,
    pub api_endpoint: Option<String>,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn create_topic(&self, name: &str) -> Result<(), BrokerError>;

    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandle, BrokerError>;

    /// Reference an existing subscription by name without any broker round-trip.
    fn subscription(&self, name: &str) -> SubscriptionHandle;

    async fn subscription_metadata(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<SubscriptionMetadata, BrokerError>;

    /// Open the delivery stream of a subscription.
    async fn subscribe(&self, handle: &SubscriptionHandle) -> Result<MessageStream, BrokerError>;

    /// Publish raw bytes to a topic, returning the broker-assigned message id.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String, BrokerError>;

    /// Stop delivery on a subscription's stream.
    async fn close_subscription(&self, handle: &SubscriptionHandle) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Factory for broker clients used by outbound connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn BrokerClient>, BrokerError>;
}
