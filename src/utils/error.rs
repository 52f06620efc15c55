//! The `error` module defines the error types shared across the transport.
//!
//! `BrokerError` (in `broker::client`) stays at the broker boundary;
//! `TransportError` is what the transport's public operations return and
//! `HandlerError` is what message handlers return.

use thiserror::Error;

use crate::broker::{BrokerError, ResourceKind};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not provision {resource} {name}: {source}")]
    Provisioning {
        resource: ResourceKind,
        name: String,
        #[source]
        source: BrokerError,
    },

    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error("broker connection failed: {0}")]
    Connection(#[source] BrokerError),

    #[error("publisher is not connected")]
    NotConnected,

    #[error("no destination topic configured")]
    MissingTopic,

    #[error("envelope pattern must be a non-empty string")]
    EmptyPattern,

    #[error("could not encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("{} subscription(s) failed to close", .0.len())]
    Shutdown(Vec<BrokerError>),
}

/// Failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid handler payload: {err}"))
    }
}
