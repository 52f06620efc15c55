//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::broker::{
    Acker, BrokerClient, BrokerError, InMemoryBroker, MessageStream, ReceivedMessage,
    SubscriptionHandle, SubscriptionMetadata, SubscriptionOptions,
};
use crate::utils::TransportLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub context: Value,
}

#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<Record>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn at(&self, level: Level) -> Vec<Record> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.level == level)
            .cloned()
            .collect()
    }

    fn push(&self, level: Level, message: &str, context: Value) {
        self.records.lock().unwrap().push(Record {
            level,
            message: message.to_string(),
            context,
        });
    }
}

impl TransportLogger for RecordingLogger {
    fn debug(&self, message: &str, context: Value) {
        self.push(Level::Debug, message, context);
    }

    fn info(&self, message: &str, context: Value) {
        self.push(Level::Info, message, context);
    }

    fn warn(&self, message: &str, context: Value) {
        self.push(Level::Warn, message, context);
    }

    fn error(&self, message: &str, context: Value) {
        self.push(Level::Error, message, context);
    }
}

/// Ordered log of ack/nack calls and handler milestones.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record(log: &EventLog, event: &str) {
    log.lock().unwrap().push(event.to_string());
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct RecordingAcker {
    log: EventLog,
}

impl Acker for RecordingAcker {
    fn ack(self: Box<Self>) {
        record(&self.log, "ack");
    }

    fn nack(self: Box<Self>) {
        record(&self.log, "nack");
    }
}

/// A delivery whose ack/nack calls are appended to `log`.
pub fn recorded_message(data: &[u8], log: &EventLog) -> ReceivedMessage {
    ReceivedMessage::new(
        "msg-1",
        data.to_vec(),
        1,
        Utc::now(),
        Box::new(RecordingAcker { log: log.clone() }),
    )
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// In-memory broker with switchable failures.
#[derive(Debug, Clone, Default)]
pub struct FlakyBroker {
    pub inner: InMemoryBroker,
    pub fail_creates: bool,
    pub fail_close: bool,
}

fn unavailable() -> BrokerError {
    BrokerError::Unavailable("injected failure".to_string())
}

#[async_trait]
impl BrokerClient for FlakyBroker {
    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        if self.fail_creates {
            return Err(unavailable());
        }
        self.inner.create_topic(name).await
    }

    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandle, BrokerError> {
        if self.fail_creates {
            return Err(unavailable());
        }
        self.inner.create_subscription(topic, name, options).await
    }

    fn subscription(&self, name: &str) -> SubscriptionHandle {
        self.inner.subscription(name)
    }

    async fn subscription_metadata(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<SubscriptionMetadata, BrokerError> {
        self.inner.subscription_metadata(handle).await
    }

    async fn subscribe(&self, handle: &SubscriptionHandle) -> Result<MessageStream, BrokerError> {
        self.inner.subscribe(handle).await
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<String, BrokerError> {
        self.inner.publish(topic, data).await
    }

    async fn close_subscription(&self, handle: &SubscriptionHandle) -> Result<(), BrokerError> {
        if self.fail_close {
            return Err(unavailable());
        }
        self.inner.close_subscription(handle).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.inner.close().await
    }
}
