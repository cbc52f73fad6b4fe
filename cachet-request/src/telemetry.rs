//! Tracing subscriber setup
//!
//! Cache decisions are logged at `debug` (`LOAD CACHE`, `NO CACHE`,
//! `CACHING`) and degraded conditions at `warn`. Set `CACHET_LOG=debug` to
//! see every reconciliation step.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "CACHET_LOG";

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `"cachet_request=debug,info"`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Read `CACHET_LOG` and `CACHET_LOG_FORMAT` ("json" or "text").
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var(LOG_ENV)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.filter),
            json: std::env::var("CACHET_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

/// Install a global fmt subscriber for `config`.
///
/// Returns false if a global subscriber was already installed, in which case
/// nothing changes. Invalid filter directives fall back to `info`.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::default()
            .with_filter("cachet_request=debug")
            .with_json(true);
        assert_eq!(config.filter, "cachet_request=debug");
        assert!(config.json);
    }

    #[test]
    fn test_second_init_is_a_no_op() {
        let config = TelemetryConfig::default().with_filter("not a [valid directive");
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
