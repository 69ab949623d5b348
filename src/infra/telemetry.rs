use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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

/// Register descriptions for every metric the cache emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stratum_cache_content_hit_total",
            Unit::Count,
            "Content cache lookups that returned a fresh entry."
        );
        describe_counter!(
            "stratum_cache_content_miss_total",
            Unit::Count,
            "Content cache lookups that found nothing or an expired entry."
        );
        describe_counter!(
            "stratum_cache_content_evict_total",
            Unit::Count,
            "Content cache entries evicted to respect the store capacity."
        );
        describe_counter!(
            "stratum_cache_response_hit_total",
            Unit::Count,
            "Requests answered from the response cache."
        );
        describe_counter!(
            "stratum_cache_response_miss_total",
            Unit::Count,
            "Admitted requests that missed the response cache."
        );
        describe_counter!(
            "stratum_cache_response_evict_total",
            Unit::Count,
            "Response cache entries evicted to respect the capacity."
        );
        describe_counter!(
            "stratum_cache_invalidation_total",
            Unit::Count,
            "Invalidation commands applied to the content cache."
        );
        describe_gauge!(
            "stratum_cache_content_entries",
            Unit::Count,
            "Entries currently held by the content cache."
        );
        describe_histogram!(
            "stratum_cache_prefetch_ms",
            Unit::Milliseconds,
            "Page prefetch latency in milliseconds."
        );
    });
}
