//! Idempotent topic/subscription provisioning
//!
//! "Already exists" from the broker is treated as success. For subscriptions
//! the existing one is referenced by name and its bound topic is checked: a
//! topic that was deleted and recreated leaves old subscriptions bound to
//! the deleted topic, and the broker cannot rebind them. That case is logged
//! as a warning and the existing subscription is used as-is.

use std::sync::Arc;

use serde_json::json;

use crate::broker::{
    BrokerClient, BrokerError, ResourceKind, SubscriptionHandle, SubscriptionOptions,
};
use crate::utils::{TransportError, TransportLogger};

pub struct ResourceProvisioner {
    broker: Arc<dyn BrokerClient>,
    logger: Arc<dyn TransportLogger>,
}

impl ResourceProvisioner {
    pub fn new(broker: Arc<dyn BrokerClient>, logger: Arc<dyn TransportLogger>) -> Self {
        Self { broker, logger }
    }

    /// Make sure topic `name` exists.
    pub async fn ensure_topic(&self, name: &str) -> Result<(), TransportError> {
        self.logger
            .log(&format!("Creating topic {name}..."), json!({ "topic": name }));

        match self.broker.create_topic(name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_exists() => {
                self.logger
                    .debug("topic already exists", json!({ "topic": name }));
                Ok(())
            }
            Err(source) => Err(provisioning_failure(ResourceKind::Topic, name, source)),
        }
    }

    /// Make sure subscription `name` exists, creating it on `topic` if needed.
    pub async fn ensure_subscription(
        &self,
        topic: &str,
        name: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandle, TransportError> {
        self.logger.info(
            &format!("creating subscription: {name} to topic {topic}"),
            json!({ "sub": name, "topic": topic }),
        );

        match self.broker.create_subscription(topic, name, options).await {
            Ok(handle) => Ok(handle),
            Err(err) if err.is_already_exists() => {
                let handle = self.broker.subscription(name);
                let metadata = self
                    .broker
                    .subscription_metadata(&handle)
                    .await
                    .map_err(|source| {
                        provisioning_failure(ResourceKind::Subscription, name, source)
                    })?;

                if !is_bound_to(&metadata.topic, topic) {
                    self.logger.warn(
                        "subscription already bound to topic",
                        json!({ "topic": metadata.topic, "requested_topic": topic, "sub": name }),
                    );
                }
                Ok(handle)
            }
            Err(source) => Err(provisioning_failure(
                ResourceKind::Subscription,
                name,
                source,
            )),
        }
    }
}

/// Metadata reports qualified names (`projects/<project>/topics/<topic>`).
pub(crate) fn is_bound_to(bound_topic: &str, topic: &str) -> bool {
    bound_topic == topic || bound_topic.ends_with(&format!("/{topic}"))
}

fn provisioning_failure(resource: ResourceKind, name: &str, source: BrokerError) -> TransportError {
    TransportError::Provisioning {
        resource,
        name: name.to_string(),
        source,
    }
}
