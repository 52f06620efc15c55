//! In-memory broker engine
//!
//! A process-local implementation of [`BrokerClient`] that behaves like a
//! hosted topic/subscription broker closely enough to drive the transport
//! end to end:
//! - topics own the set of subscriptions bound to them
//! - messages published while a subscription has no open stream are retained
//!   in its backlog and flushed on the next `subscribe`
//! - every delivery stays outstanding until it is acked; a nack, or an
//!   `ack_deadline` that passes first, redelivers it until
//!   `max_delivery_attempts` is reached, after which it goes to the
//!   dead-letter topic (if any) or is dropped
//! - acks are tied to one delivery attempt; resolving a delivery that was
//!   already redelivered or requeued is ignored
//! - deleting a topic leaves its subscriptions bound to `_deleted-topic_`
//!
//! Concurrency notes:
//! - State lives behind a single `std::sync::Mutex`. No lock is held across
//!   an `.await`; pushing into an unbounded channel never blocks.
//! - Clones share topics and subscriptions but each client handed out by
//!   [`BrokerConnector::connect`] has its own closed flag, so closing one
//!   client does not tear down the others.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::client::{
    BrokerClient, BrokerConnector, BrokerError, ConnectionSettings, MessageStream, ResourceKind,
    SubscriptionHandle, SubscriptionMetadata, SubscriptionOptions,
};
use crate::broker::message::{Acker, ReceivedMessage};
use crate::broker::topic::Topic;

/// Topic reported for subscriptions whose topic was deleted.
pub const DELETED_TOPIC: &str = "_deleted-topic_";

pub const DEFAULT_PROJECT_ID: &str = "local-project";

#[derive(Debug, Clone)]
struct PendingMessage {
    id: String,
    data: Vec<u8>,
    publish_time: DateTime<Utc>,
    attempts: u32,
}

#[derive(Debug)]
struct SubscriptionState {
    topic: String,
    options: SubscriptionOptions,
    sender: Option<UnboundedSender<ReceivedMessage>>,
    backlog: VecDeque<PendingMessage>,
    outstanding: HashMap<String, PendingMessage>,
    acked: u64,
    nacked: u64,
    expired: u64,
    dead_lettered: u64,
}

impl SubscriptionState {
    fn new(topic: &str, options: SubscriptionOptions) -> Self {
        Self {
            topic: topic.to_string(),
            options,
            sender: None,
            backlog: VecDeque::new(),
            outstanding: HashMap::new(),
            acked: 0,
            nacked: 0,
            expired: 0,
            dead_lettered: 0,
        }
    }

    fn max_delivery_attempts(&self) -> u32 {
        self.options
            .max_delivery_attempts
            .unwrap_or(InMemoryBroker::MAX_DELIVERY_ATTEMPTS)
            .max(1)
    }

    /// Push a message into the open stream, or park it in the backlog.
    fn dispatch(&mut self, shared: &Weak<Mutex<BrokerState>>, name: &str, message: PendingMessage) {
        let Some(sender) = &self.sender else {
            self.backlog.push_back(message);
            return;
        };

        let attempt = message.attempts + 1;
        let acker = MemoryAcker {
            state: shared.clone(),
            subscription: name.to_string(),
            message_id: message.id.clone(),
            attempt,
        };
        let delivery = ReceivedMessage::new(
            message.id.clone(),
            message.data.clone(),
            attempt,
            message.publish_time,
            Box::new(acker),
        );

        if sender.send(delivery).is_ok() {
            if let Some(deadline) = self.options.ack_deadline {
                watch_ack_deadline(shared, name, &message.id, attempt, deadline);
            }
            self.outstanding.insert(
                message.id.clone(),
                PendingMessage {
                    attempts: attempt,
                    ..message
                },
            );
        } else {
            debug!(subscription = name, "delivery stream dropped, parking message");
            self.sender = None;
            self.backlog.push_back(message);
        }
    }

    /// Remove an outstanding delivery, but only the given attempt of it.
    fn take_outstanding(&mut self, message_id: &str, attempt: u32) -> Option<PendingMessage> {
        match self.outstanding.get(message_id) {
            Some(message) if message.attempts == attempt => self.outstanding.remove(message_id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Topic>,
    subscriptions: HashMap<String, SubscriptionState>,
}

impl BrokerState {
    fn fan_out(
        &mut self,
        shared: &Weak<Mutex<BrokerState>>,
        topic: &str,
        message: PendingMessage,
    ) -> Result<(), BrokerError> {
        let names: Vec<String> = self
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::NotFound {
                kind: ResourceKind::Topic,
                name: topic.to_string(),
            })?
            .subscriptions
            .iter()
            .cloned()
            .collect();

        for name in names {
            if let Some(subscription) = self.subscriptions.get_mut(&name) {
                subscription.dispatch(shared, &name, message.clone());
            }
        }
        Ok(())
    }

    /// Redeliver an unresolved delivery, or dead-letter it once its attempts
    /// are used up.
    fn release(&mut self, shared: &Weak<Mutex<BrokerState>>, name: &str, message: PendingMessage) {
        let Some(subscription) = self.subscriptions.get_mut(name) else {
            return;
        };
        if message.attempts < subscription.max_delivery_attempts() {
            subscription.dispatch(shared, name, message);
            return;
        }

        subscription.dead_lettered += 1;
        let attempts = message.attempts;
        match subscription.options.dead_letter_topic.clone() {
            Some(dead_letter_topic) => {
                warn!(
                    message_id = %message.id,
                    subscription = name,
                    attempts,
                    dead_letter_topic = %dead_letter_topic,
                    "max delivery attempts reached, dead-lettering message"
                );
                let forwarded = PendingMessage {
                    attempts: 0,
                    ..message
                };
                if let Err(err) = self.fan_out(shared, &dead_letter_topic, forwarded) {
                    warn!(error = %err, "dead-letter topic unavailable, message dropped");
                }
            }
            None => {
                warn!(
                    message_id = %message.id,
                    subscription = name,
                    attempts,
                    "message dropped after max delivery attempts"
                );
            }
        }
    }
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemoryAcker {
    state: Weak<Mutex<BrokerState>>,
    subscription: String,
    message_id: String,
    attempt: u32,
}

impl Acker for MemoryAcker {
    fn ack(self: Box<Self>) {
        let Some(shared) = self.state.upgrade() else {
            return;
        };
        let mut state = lock(&shared);
        let Some(subscription) = state.subscriptions.get_mut(&self.subscription) else {
            return;
        };
        if subscription
            .take_outstanding(&self.message_id, self.attempt)
            .is_some()
        {
            subscription.acked += 1;
        } else {
            debug!(
                message_id = %self.message_id,
                subscription = %self.subscription,
                attempt = self.attempt,
                "ack for a delivery that is no longer outstanding"
            );
        }
    }

    fn nack(self: Box<Self>) {
        let Some(shared) = self.state.upgrade() else {
            return;
        };
        let mut state = lock(&shared);
        let Some(subscription) = state.subscriptions.get_mut(&self.subscription) else {
            return;
        };
        let Some(message) = subscription.take_outstanding(&self.message_id, self.attempt) else {
            debug!(
                message_id = %self.message_id,
                subscription = %self.subscription,
                attempt = self.attempt,
                "nack for a delivery that is no longer outstanding"
            );
            return;
        };
        subscription.nacked += 1;
        state.release(&self.state, &self.subscription, message);
    }
}

/// Redeliver `message_id` once `deadline` passes, unless that attempt was
/// resolved in the meantime.
fn watch_ack_deadline(
    shared: &Weak<Mutex<BrokerState>>,
    subscription: &str,
    message_id: &str,
    attempt: u32,
    deadline: Duration,
) {
    let Ok(runtime) = Handle::try_current() else {
        debug!(subscription, "no runtime available, ack deadline not enforced");
        return;
    };
    let shared = shared.clone();
    let subscription = subscription.to_string();
    let message_id = message_id.to_string();

    runtime.spawn(async move {
        tokio::time::sleep(deadline).await;
        let Some(live) = shared.upgrade() else {
            return;
        };
        let mut state = lock(&live);
        let Some(sub) = state.subscriptions.get_mut(&subscription) else {
            return;
        };
        let Some(message) = sub.take_outstanding(&message_id, attempt) else {
            return;
        };
        sub.expired += 1;
        debug!(
            message_id = %message_id,
            subscription = %subscription,
            attempt,
            "ack deadline expired"
        );
        state.release(&shared, &subscription, message);
    });
}

/// Delivery counters for one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub backlog: usize,
    pub outstanding: usize,
    pub acked: u64,
    pub nacked: u64,
    /// Deliveries whose ack deadline passed before they were resolved.
    pub expired: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    project_id: String,
    state: Arc<Mutex<BrokerState>>,
    closed: Arc<AtomicBool>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Deliveries per message before it is dead-lettered, unless the
    /// subscription overrides it.
    pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

    pub fn new() -> Self {
        Self::with_project(DEFAULT_PROJECT_ID)
    }

    pub fn with_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state: Arc::new(Mutex::new(BrokerState::default())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove a topic. Its subscriptions survive, bound to [`DELETED_TOPIC`].
    pub fn delete_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.state();
        let topic = state.topics.remove(name).ok_or_else(|| BrokerError::NotFound {
            kind: ResourceKind::Topic,
            name: name.to_string(),
        })?;
        for subscription in &topic.subscriptions {
            if let Some(sub) = state.subscriptions.get_mut(subscription) {
                sub.topic = DELETED_TOPIC.to_string();
            }
        }
        debug!(topic = name, orphaned = topic.subscriptions.len(), "topic deleted");
        Ok(())
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn subscription_stats(&self, name: &str) -> Option<SubscriptionStats> {
        self.state()
            .subscriptions
            .get(name)
            .map(|sub| SubscriptionStats {
                backlog: sub.backlog.len(),
                outstanding: sub.outstanding.len(),
                acked: sub.acked,
                nacked: sub.nacked,
                expired: sub.expired,
                dead_lettered: sub.dead_lettered,
            })
    }

    fn topic_path(&self, topic: &str) -> String {
        if topic == DELETED_TOPIC {
            return DELETED_TOPIC.to_string();
        }
        format!("projects/{}/topics/{}", self.project_id, topic)
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        lock(&self.state)
    }
}

fn subscription_not_found(name: &str) -> BrokerError {
    BrokerError::NotFound {
        kind: ResourceKind::Subscription,
        name: name.to_string(),
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.state();
        if state.topics.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: ResourceKind::Topic,
                name: name.to_string(),
            });
        }
        state.topics.insert(name.to_string(), Topic::new(name));
        debug!(topic = name, "topic created");
        Ok(())
    }

    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandle, BrokerError> {
        self.ensure_open()?;
        let mut state = self.state();
        if state.subscriptions.contains_key(name) {
            return Err(BrokerError::AlreadyExists {
                kind: ResourceKind::Subscription,
                name: name.to_string(),
            });
        }
        let bound = state.topics.get_mut(topic).ok_or_else(|| BrokerError::NotFound {
            kind: ResourceKind::Topic,
            name: topic.to_string(),
        })?;
        bound.attach(name.to_string());
        state
            .subscriptions
            .insert(name.to_string(), SubscriptionState::new(topic, options.clone()));
        debug!(topic, subscription = name, "subscription created");
        Ok(SubscriptionHandle::new(name))
    }

    fn subscription(&self, name: &str) -> SubscriptionHandle {
        SubscriptionHandle::new(name)
    }

    async fn subscription_metadata(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<SubscriptionMetadata, BrokerError> {
        self.ensure_open()?;
        let state = self.state();
        let subscription = state
            .subscriptions
            .get(handle.name())
            .ok_or_else(|| subscription_not_found(handle.name()))?;
        Ok(SubscriptionMetadata {
            name: handle.name().to_string(),
            topic: self.topic_path(&subscription.topic),
        })
    }

    async fn subscribe(&self, handle: &SubscriptionHandle) -> Result<MessageStream, BrokerError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::downgrade(&self.state);
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(handle.name())
            .ok_or_else(|| subscription_not_found(handle.name()))?;

        subscription.sender = Some(tx);
        let backlog: Vec<PendingMessage> = subscription.backlog.drain(..).collect();
        for message in backlog {
            subscription.dispatch(&shared, handle.name(), message);
        }
        debug!(subscription = handle.name(), "delivery stream opened");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String, BrokerError> {
        self.ensure_open()?;
        let id = Uuid::new_v4().to_string();
        let message = PendingMessage {
            id: id.clone(),
            data,
            publish_time: Utc::now(),
            attempts: 0,
        };
        let shared = Arc::downgrade(&self.state);
        self.state().fan_out(&shared, topic, message)?;
        Ok(id)
    }

    async fn close_subscription(&self, handle: &SubscriptionHandle) -> Result<(), BrokerError> {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(handle.name())
            .ok_or_else(|| subscription_not_found(handle.name()))?;

        subscription.sender = None;
        // Unacked deliveries go back to the front of the queue for the next stream.
        let mut requeued: Vec<PendingMessage> =
            subscription.outstanding.drain().map(|(_, message)| message).collect();
        requeued.sort_by_key(|message| message.publish_time);
        for message in requeued.into_iter().rev() {
            subscription.backlog.push_front(message);
        }
        debug!(subscription = handle.name(), "delivery stream closed");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn BrokerClient>, BrokerError> {
        debug!(
            project_id = ?settings.project_id,
            api_endpoint = ?settings.api_endpoint,
            "opening in-memory broker client"
        );
        Ok(Arc::new(InMemoryBroker {
            project_id: settings
                .project_id
                .clone()
                .unwrap_or_else(|| self.project_id.clone()),
            state: self.state.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}
