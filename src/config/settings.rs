use serde::Deserialize;

use crate::broker::{ConnectionSettings, SubscriptionOptions};
use crate::client::PublishMode;
use crate::transport::{AckPolicy, ServerOptions};

/// Top-level configuration settings for the application.
///
/// Includes the broker connection, logging and publisher settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub pubsub: PubSubSettings,
    pub logging: LoggingSettings,
    pub publisher: PublisherSettings,
}

/// Broker connection target and default resources.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PubSubSettings {
    pub project_id: Option<String>,
    pub api_endpoint: Option<String>,
    pub topic: Option<String>,
    pub subscription: Option<String>,
    /// Ack only after the handler succeeded.
    pub ack_after_handler: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// When false the transport logs nothing at all.
    pub enabled: bool,
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Fail `publish` instead of returning no id when misconfigured.
    pub strict: bool,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub pubsub: Option<PartialPubSubSettings>,
    pub logging: Option<PartialLoggingSettings>,
    pub publisher: Option<PartialPublisherSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPubSubSettings {
    pub project_id: Option<String>,
    pub api_endpoint: Option<String>,
    pub topic: Option<String>,
    pub subscription: Option<String>,
    pub ack_after_handler: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub enabled: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPublisherSettings {
    pub strict: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pubsub: PubSubSettings::default(),
            logging: LoggingSettings {
                enabled: true,
                level: "info".to_string(),
            },
            publisher: PublisherSettings::default(),
        }
    }
}

impl Settings {
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            default_topic: self.pubsub.topic.clone(),
            default_subscription: self.pubsub.subscription.clone(),
            ack_policy: AckPolicy::from_ack_after_handler(self.pubsub.ack_after_handler),
            subscription_options: SubscriptionOptions::default(),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            project_id: self.pubsub.project_id.clone(),
            api_endpoint: self.pubsub.api_endpoint.clone(),
        }
    }

    pub fn publish_mode(&self) -> PublishMode {
        if self.publisher.strict {
            PublishMode::Strict
        } else {
            PublishMode::Silent
        }
    }
}
