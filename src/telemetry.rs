//! Logging setup
//!
//! Installs a `tracing-subscriber` registry. `RUST_LOG` wins over the
//! level passed in, which wins over the `info` default.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given default level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = format!("{},ostinato={}", log_level, log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

/// Initialize the tracing subscriber at `info`
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}
