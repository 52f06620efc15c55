use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::broker::{ConnectionSettings, InMemoryBroker};
use crate::client::{BrokerConnection, EventPublisher};
use crate::tests::support::{Level, RecordingLogger, wait_until};
use crate::transport::{AckPolicy, HandlerRegistry, ServerOptions, TransportServer};
use crate::utils::HandlerError;

#[tokio::test]
async fn integration_publish_and_dispatch_end_to_end() {
    let broker = InMemoryBroker::with_project("acme");
    let logger = RecordingLogger::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();

    let mut registry = HandlerRegistry::new();
    for pattern in ["orders.created", "orders.cancelled"] {
        let tx = tx.clone();
        registry.register(pattern, move |data| {
            let tx = tx.clone();
            async move {
                match tx.send((pattern.to_string(), data)) {
                    Ok(()) => Ok(Value::Null),
                    Err(err) => Err(HandlerError::new(err.to_string())),
                }
            }
        });
    }

    let server = TransportServer::new(
        Arc::new(broker.clone()),
        registry,
        ServerOptions {
            default_topic: Some("orders".to_string()),
            default_subscription: Some("billing".to_string()),
            ack_policy: AckPolicy::AfterHandler,
            ..ServerOptions::default()
        },
        logger.clone(),
    )
    .expect("valid server options");

    let mut ready = false;
    server.listen(|| ready = true).await;
    assert!(ready);

    let connection = Arc::new(BrokerConnection::new(
        ConnectionSettings {
            project_id: Some("acme".to_string()),
            api_endpoint: None,
        },
        Arc::new(broker.clone()),
        logger.clone(),
    ));
    let publisher = EventPublisher::new(connection, Some("orders".to_string()), logger.clone());
    publisher.connect().await.expect("connect");

    let id = publisher
        .publish("orders.created", json!({ "order": 1 }))
        .await
        .expect("publish")
        .expect("message id");
    assert!(!id.is_empty());
    publisher
        .publish("orders.unknown", json!({ "order": 2 }))
        .await
        .expect("publish");

    let (pattern, data) = rx.recv().await.expect("handler invoked");
    assert_eq!(pattern, "orders.created");
    assert_eq!(data, json!({ "order": 1 }));

    assert!(
        wait_until(|| logger
            .at(Level::Error)
            .iter()
            .any(|record| record.message == "no handler exists for \"orders.unknown\""))
        .await
    );
    assert!(
        wait_until(|| broker
            .subscription_stats("billing")
            .is_some_and(|stats| stats.acked == 1))
        .await
    );

    publisher.close().await.expect("close publisher");
    server.close().await.expect("close server");
    assert_eq!(server.subscription_count(), 0);
    assert!(
        publisher
            .publish("orders.created", json!({}))
            .await
            .expect("silent mode")
            .is_none()
    );
}
