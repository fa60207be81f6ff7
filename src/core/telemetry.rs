use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::{Settings, TelemetrySettings};

/// Driver chatter that would otherwise drown grading events at `debug`.
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn", "hyper=warn"];

/// `RUST_LOG` wins; otherwise the configured level with the driver directives appended.
fn env_filter(telemetry: &TelemetrySettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(telemetry)))
}

fn default_directives(telemetry: &TelemetrySettings) -> String {
    let mut directives = vec![telemetry.log_level.trim().to_string()];
    directives.extend(QUIET_DIRECTIVES.iter().map(|directive| directive.to_string()));
    directives.join(",")
}

pub fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let registry = tracing_subscriber::registry().with(env_filter(telemetry));

    // JSON output feeds log shipping, so span timings are kept there only.
    if telemetry.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_events(FmtSpan::CLOSE))
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        registry
            .with(fmt::layer().compact().with_target(false))
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = telemetry.json,
        "Tracing initialised"
    );
    Ok(())
}
