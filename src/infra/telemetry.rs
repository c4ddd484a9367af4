use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::dispatch::METRIC_FAILURE_TOTAL;
use crate::application::registry::METRIC_REGISTRY_RELOAD_TOTAL;
use crate::application::rendition::{
    METRIC_CONSUME_MS, METRIC_DISPATCH_TOTAL, METRIC_STALE_REPLY_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
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
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_DISPATCH_TOTAL,
            Unit::Count,
            "Total number of requests handed to a transform client."
        );
        describe_counter!(
            METRIC_STALE_REPLY_TOTAL,
            Unit::Count,
            "Total number of replies discarded because the source changed."
        );
        describe_counter!(
            METRIC_FAILURE_TOTAL,
            Unit::Count,
            "Total number of transforms that failed in the engine."
        );
        describe_counter!(
            METRIC_REGISTRY_RELOAD_TOTAL,
            Unit::Count,
            "Total number of definition registry reloads, by result."
        );
        describe_histogram!(
            METRIC_CONSUME_MS,
            Unit::Milliseconds,
            "Reply handling latency in milliseconds."
        );
    });
}
