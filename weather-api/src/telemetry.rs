use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: JSON lines on stderr, filtered by `RUST_LOG`.
///
/// Defaults to "info,weather_core=debug,weather_api=debug".
pub fn init(service_name: &str) {
    let default_filter = "info,weather_core=debug,weather_api=debug";
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    tracing::debug!(service = %service_name, "tracing initialized");
}
