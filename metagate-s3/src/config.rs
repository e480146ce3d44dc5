//! Configuration management

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Namespace mixed into every bucket UID
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Default deadline applied to contexts created by the gateway
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            request_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatewayConfig {
    /// Load configuration from an optional `metagate` file and `METAGATE_*`
    /// environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("metagate").required(false))
                .add_source(config::Environment::with_prefix("METAGATE").try_parsing(true)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize::<GatewayConfig>()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
