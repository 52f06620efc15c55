use std::sync::Arc;

use pubsub_transport::broker::InMemoryBroker;
use pubsub_transport::broker::engine::DEFAULT_PROJECT_ID;
use pubsub_transport::client::{BrokerConnection, EventPublisher};
use pubsub_transport::config::{Settings, load_config};
use pubsub_transport::transport::{HandlerRegistry, TransportServer};
use pubsub_transport::utils::{HandlerError, TransportError, logger_for, logging};
use serde_json::{Value, json};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    if let Err(e) = run(settings).await {
        error!("Transport failed: {}", e);
        std::process::exit(1);
    }
}

fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register("ping", |data| async move {
            info!(%data, "ping received");
            Ok(json!({ "pong": true }))
        })
        .register("echo", |data: Value| async move {
            if data.is_null() {
                return Err(HandlerError::new("nothing to echo"));
            }
            info!(%data, "echo");
            Ok(data)
        });
    registry
}

async fn run(settings: Settings) -> Result<(), TransportError> {
    let logger = logger_for(settings.logging.enabled);
    let broker = InMemoryBroker::with_project(
        settings
            .pubsub
            .project_id
            .clone()
            .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
    );

    let server = TransportServer::new(
        Arc::new(broker.clone()),
        registry(),
        settings.server_options(),
        logger.clone(),
    )?;
    server.listen(|| info!("Pub/Sub transport ready")).await;

    let connection = Arc::new(BrokerConnection::new(
        settings.connection_settings(),
        Arc::new(broker),
        logger.clone(),
    ));
    let publisher = EventPublisher::new(connection, settings.pubsub.topic.clone(), logger)
        .with_mode(settings.publish_mode());
    publisher.connect().await?;

    if let Some(message_id) = publisher.publish("ping", json!({ "source": "startup" })).await? {
        info!(%message_id, "Startup event published");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received. Exiting gracefully.");

    publisher.close().await?;
    server.close().await
}
