//! Tracing initialization
//!
//! Structured logging with env-filter control. JSON output is enabled via
//! `MESHWORK_LOG_FORMAT=json` for production deployments.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` (default "info"). Safe to call once per
/// process; later calls return an error from the subscriber registry.
pub fn init_telemetry(service_name: &str) -> Result<(), crate::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("MESHWORK_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };

    result.map_err(|e| {
        crate::Error::internal("telemetry", format!("failed to init subscriber: {e}"))
    })?;

    tracing::info!(service = %service_name, "telemetry initialized");
    Ok(())
}
