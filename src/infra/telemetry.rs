use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level directive `{directive}`")]
    InvalidLevel { directive: String },
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let level: LevelFilter = logging
        .level
        .parse()
        .map_err(|_| TelemetryError::InvalidLevel {
            directive: logging.level.clone(),
        })?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "catenaccio_cache_hit_fresh_total",
            Unit::Count,
            "Total number of cache hits served within the fresh TTL."
        );
        describe_counter!(
            "catenaccio_cache_hit_stale_total",
            Unit::Count,
            "Total number of stale hits served while revalidating in the background."
        );
        describe_counter!(
            "catenaccio_cache_miss_total",
            Unit::Count,
            "Total number of accesses that required a synchronous upstream fetch."
        );
        describe_counter!(
            "catenaccio_cache_revalidation_total",
            Unit::Count,
            "Total number of completed background revalidations."
        );
        describe_counter!(
            "catenaccio_cache_revalidation_failed_total",
            Unit::Count,
            "Total number of background revalidations that failed and were absorbed."
        );
        describe_histogram!(
            "catenaccio_upstream_fetch_ms",
            Unit::Milliseconds,
            "Latency of coalesced upstream fetches in milliseconds."
        );
    });
}
