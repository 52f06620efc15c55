//! Outbound event publisher
//!
//! Wraps `{pattern, data}` in the wire envelope and publishes it to the
//! configured destination topic over a shared [`BrokerConnection`].

use std::sync::Arc;

use serde_json::{Value, json};

use crate::client::connection::BrokerConnection;
use crate::transport::envelope;
use crate::utils::{TransportError, TransportLogger};

/// What `publish` does when there is no connection or no destination topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishMode {
    /// Log a warning and return `Ok(None)`.
    #[default]
    Silent,
    /// Return `NotConnected` / `MissingTopic`.
    Strict,
}

pub struct EventPublisher {
    connection: Arc<BrokerConnection>,
    topic: Option<String>,
    mode: PublishMode,
    logger: Arc<dyn TransportLogger>,
}

impl EventPublisher {
    pub fn new(
        connection: Arc<BrokerConnection>,
        topic: Option<String>,
        logger: Arc<dyn TransportLogger>,
    ) -> Self {
        Self {
            connection,
            topic,
            mode: PublishMode::default(),
            logger,
        }
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        self.connection.connect().await
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.connection.close().await
    }

    /// Publish an event, returning the broker-assigned message id.
    ///
    /// Without a connection or a destination topic this returns `Ok(None)`
    /// in [`PublishMode::Silent`] and an error in [`PublishMode::Strict`].
    pub async fn publish(&self, pattern: &str, data: Value) -> Result<Option<String>, TransportError> {
        self.logger
            .debug("received msg", json!({ "pattern": pattern, "data": &data }));

        let Some(client) = self.connection.client().await else {
            return self.misconfigured(TransportError::NotConnected);
        };
        let Some(topic) = self.topic.as_deref().filter(|topic| !topic.is_empty()) else {
            return self.misconfigured(TransportError::MissingTopic);
        };

        let payload = envelope::encode(pattern, &data)?;
        let message_id = client
            .publish(topic, payload)
            .await
            .map_err(|source| TransportError::Publish {
                topic: topic.to_string(),
                source,
            })?;
        Ok(Some(message_id))
    }

    fn misconfigured(&self, err: TransportError) -> Result<Option<String>, TransportError> {
        match self.mode {
            PublishMode::Silent => {
                self.logger
                    .warn("no pub sub client/topic", json!({ "reason": err.to_string() }));
                Ok(None)
            }
            PublishMode::Strict => Err(err),
        }
    }
}
