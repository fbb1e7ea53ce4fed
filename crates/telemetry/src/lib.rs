//! Tracing subscriber bootstrap shared by every changeapp binary.

use anyhow::Context;
use changeapp_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve the filter directive: `RUST_LOG`, then the configured filter, then
/// the configured level.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = settings
        .filter
        .clone()
        .unwrap_or_else(|| settings.log_level.clone());
    EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))
}

/// Install the global subscriber, logging to stderr so stdout stays free for
/// command output. Returns `Ok(false)` when one is already set.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<bool> {
    let filter = env_filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match settings.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(
            target: "changeapp-telemetry",
            format = ?settings.log_format,
            "telemetry initialized"
        );
    }
    Ok(installed)
}
