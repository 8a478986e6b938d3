//! Tracing setup shared by the server and the CLI

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins over the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "project_red={level},project_red_cli={level},tower_http=info",
            level = config.level
        ))
    })
}

/// Install the global subscriber.
///
/// `format = "json"` emits one JSON object per event; anything else uses
/// the human-readable formatter. Calling this twice is harmless: the
/// second install fails and is ignored.
pub fn init(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialised: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_uses_configured_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = env_filter(&LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        });
        assert!(filter.to_string().contains("project_red=debug"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init(&config);
        init(&config);
    }
}
