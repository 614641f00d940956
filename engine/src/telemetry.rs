//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging of router attempts,
//! stage transitions and job transitions.
//! Supports config-driven log levels, environment variable overrides,
//! and format switching between pretty (debug) and JSON (release).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive for a log level
///
/// Priority: `RUST_LOG` env var > `log_level` parameter
fn filter_for(log_level: &str) -> EnvFilter {
    let default_filter = format!("{},forge_engine={}", log_level, log_level);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter))
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// In debug builds: pretty-printed terminal output on stderr.
/// In release builds: JSON structured output with spans on stderr.
///
/// Only the first call installs a subscriber; later calls are no-ops, so the
/// CLI can initialize early and tests can call this freely.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = filter_for(log_level);

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
