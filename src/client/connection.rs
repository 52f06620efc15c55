//! Broker connection lifecycle
//!
//! `BrokerConnection` owns at most one broker client. `connect` is idempotent
//! and `close` tears the client down; both serialize on an async mutex so
//! concurrent callers never open two clients.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::broker::{BrokerClient, BrokerConnector, ConnectionSettings};
use crate::utils::{TransportError, TransportLogger};

pub struct BrokerConnection {
    settings: ConnectionSettings,
    connector: Arc<dyn BrokerConnector>,
    client: Mutex<Option<Arc<dyn BrokerClient>>>,
    logger: Arc<dyn TransportLogger>,
}

impl BrokerConnection {
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn BrokerConnector>,
        logger: Arc<dyn TransportLogger>,
    ) -> Self {
        Self {
            settings,
            connector,
            client: Mutex::new(None),
            logger,
        }
    }

    /// Open the broker client unless one is already open.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut client = self.client.lock().await;
        if client.is_some() {
            return Ok(());
        }

        self.logger.debug(
            "connecting to pub sub",
            json!({
                "project_id": self.settings.project_id,
                "api_endpoint": self.settings.api_endpoint,
            }),
        );
        let connected = self
            .connector
            .connect(&self.settings)
            .await
            .map_err(TransportError::Connection)?;
        *client = Some(connected);
        Ok(())
    }

    /// The open client, if any.
    pub async fn client(&self) -> Option<Arc<dyn BrokerClient>> {
        self.client.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Close the client if one is open. Safe to call repeatedly.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.logger.debug("closing the pubsub connection", json!({}));
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        client.close().await.map_err(TransportError::Connection)
    }
}
