mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LoggingSettings, PubSubSettings, PublisherSettings, Settings};

/// Prefix for structured environment overrides, e.g. `APP__PUBSUB__TOPIC`.
pub const ENV_PREFIX: &str = "APP";

/// Flat variables understood for compatibility with existing deployments.
const LEGACY_ENV: [(&str, &str); 4] = [
    ("PUB_SUB_PROJECT_ID", "pubsub.project_id"),
    ("PUB_SUB_ENDPOINT", "pubsub.api_endpoint"),
    ("PUB_SUB_TOPIC", "pubsub.topic"),
    ("PUB_SUB_SUB_ID", "pubsub.subscription"),
];

/// Enables ack-after-handler when set to exactly `"true"`.
const LEGACY_ACK_ENV: &str = "PUB_SUB_AUTO_ACK";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the broker, logging and publisher configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

    for (var, key) in LEGACY_ENV {
        if let Ok(value) = std::env::var(var) {
            builder = builder.set_override(key, value)?;
        }
    }
    if let Ok(value) = std::env::var(LEGACY_ACK_ENV) {
        builder = builder.set_override("pubsub.ack_after_handler", value == "true")?;
    }

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();
    let pubsub = partial.pubsub;
    let logging = partial.logging;
    let publisher = partial.publisher;

    Ok(Settings {
        pubsub: PubSubSettings {
            project_id: pubsub.as_ref().and_then(|p| p.project_id.clone()),
            api_endpoint: pubsub.as_ref().and_then(|p| p.api_endpoint.clone()),
            topic: pubsub.as_ref().and_then(|p| p.topic.clone()),
            subscription: pubsub.as_ref().and_then(|p| p.subscription.clone()),
            ack_after_handler: pubsub
                .as_ref()
                .and_then(|p| p.ack_after_handler)
                .unwrap_or(default.pubsub.ack_after_handler),
        },
        logging: LoggingSettings {
            enabled: logging
                .as_ref()
                .and_then(|l| l.enabled)
                .unwrap_or(default.logging.enabled),
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
        publisher: PublisherSettings {
            strict: publisher
                .as_ref()
                .and_then(|p| p.strict)
                .unwrap_or(default.publisher.strict),
        },
    })
}
