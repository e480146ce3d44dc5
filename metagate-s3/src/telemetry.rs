//! Tracing subscriber setup

use crate::config::GatewayConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "metagate_s3={level},metagate_core={level}",
            level = config.log_level
        )
        .into()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = GatewayConfig {
            log_level: "debug".into(),
            ..GatewayConfig::default()
        };
        init(&config);
        init(&config);
        tracing::debug!("subscriber installed");
    }
}
