//! Transport server
//!
//! Wires provisioning, subscription streams and the ack/dispatch pipeline
//! together:
//! - `listen` provisions the default topic and subscription (if configured),
//!   logging rather than propagating failures, then signals readiness
//! - every subscription gets a reader task; each delivered message is
//!   processed on its own task, so handlers run concurrently and in no
//!   particular order
//! - `close` closes every tracked subscription concurrently and reports all
//!   failures together. In-flight handler tasks are not awaited.
//!
//! The subscription list is only appended to while running and drained by
//! `close`; the std mutex around it is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::broker::{
    BrokerClient, BrokerError, MessageStream, ResourceKind, SubscriptionHandle,
    SubscriptionOptions,
};
use crate::transport::pipeline::{AckDispatchPipeline, AckPolicy};
use crate::transport::provision::ResourceProvisioner;
use crate::transport::registry::HandlerRegistry;
use crate::utils::{TransportError, TransportLogger};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub default_topic: Option<String>,
    pub default_subscription: Option<String>,
    pub ack_policy: AckPolicy,
    /// Applied when the default subscription has to be created.
    pub subscription_options: SubscriptionOptions,
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    reader: JoinHandle<()>,
}

pub struct TransportServer {
    broker: Arc<dyn BrokerClient>,
    provisioner: ResourceProvisioner,
    pipeline: AckDispatchPipeline,
    options: ServerOptions,
    logger: Arc<dyn TransportLogger>,
    subscriptions: Mutex<Vec<ActiveSubscription>>,
}

impl TransportServer {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        registry: HandlerRegistry,
        options: ServerOptions,
        logger: Arc<dyn TransportLogger>,
    ) -> Result<Self, TransportError> {
        if options.default_subscription.is_some() && options.default_topic.is_none() {
            return Err(TransportError::InvalidConfig(
                "default subscription name provided without a topic".to_string(),
            ));
        }

        let provisioner = ResourceProvisioner::new(broker.clone(), logger.clone());
        let pipeline =
            AckDispatchPipeline::new(Arc::new(registry), options.ack_policy, logger.clone());

        Ok(Self {
            broker,
            provisioner,
            pipeline,
            options,
            logger,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Provision the default topic and subscription, then call `on_ready`.
    ///
    /// Provisioning failures are logged; `on_ready` is always invoked.
    pub async fn listen<F>(&self, on_ready: F)
    where
        F: FnOnce(),
    {
        if let Some(topic) = &self.options.default_topic {
            if let Err(err) = self.create_topic(topic).await {
                self.logger.error(
                    &format!("could not create the default topic {topic}: {err}"),
                    json!({ "err": err.to_string(), "topic": topic }),
                );
            }

            if let Some(subscription) = &self.options.default_subscription {
                let options = &self.options.subscription_options;
                if let Err(err) = self.create_subscription(topic, subscription, options).await {
                    self.logger.error(
                        &format!("could not create the default subscription {subscription}: {err}"),
                        json!({ "err": err.to_string(), "subscription": subscription }),
                    );
                }
            }
        }

        on_ready();
    }

    pub async fn create_topic(&self, name: &str) -> Result<(), TransportError> {
        self.provisioner.ensure_topic(name).await
    }

    /// Ensure the subscription exists, open its stream and start dispatching.
    pub async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandle, TransportError> {
        let handle = self
            .provisioner
            .ensure_subscription(topic, name, options)
            .await?;

        let stream = self
            .broker
            .subscribe(&handle)
            .await
            .map_err(|source| TransportError::Provisioning {
                resource: ResourceKind::Subscription,
                name: name.to_string(),
                source,
            })?;

        let reader = self.spawn_reader(name.to_string(), stream);
        self.tracked().push(ActiveSubscription {
            handle: handle.clone(),
            reader,
        });
        Ok(handle)
    }

    fn spawn_reader(&self, subscription: String, mut stream: MessageStream) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.recv().await {
                let pipeline = pipeline.clone();
                let subscription = subscription.clone();
                tokio::spawn(async move {
                    pipeline.process(message, &subscription).await;
                });
            }
        })
    }

    /// Close every tracked subscription.
    ///
    /// All closures run concurrently; failures are collected rather than
    /// stopping at the first one.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.logger.log("Closing connection...", json!({}));

        let active = std::mem::take(&mut *self.tracked());
        let results = join_all(
            active
                .iter()
                .map(|subscription| self.broker.close_subscription(&subscription.handle)),
        )
        .await;

        for subscription in &active {
            subscription.reader.abort();
        }

        let failures: Vec<BrokerError> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            return Ok(());
        }

        self.logger.error(
            "failed to close subscriptions",
            json!({ "errors": failures.iter().map(ToString::to_string).collect::<Vec<_>>() }),
        );
        Err(TransportError::Shutdown(failures))
    }

    pub fn subscription_count(&self) -> usize {
        self.tracked().len()
    }

    pub fn subscription_names(&self) -> Vec<String> {
        self.tracked()
            .iter()
            .map(|subscription| subscription.handle.name().to_string())
            .collect()
    }

    fn tracked(&self) -> MutexGuard<'_, Vec<ActiveSubscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
