//! Prometheus metrics for stream consumption and health reporting

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_counter_vec, CounterVec, IntCounterVec};

/// Consumption driver metrics
pub struct StreamMetrics {
    /// Messages consumed counter
    pub messages_consumed: IntCounterVec,

    /// Payload bytes consumed counter
    pub bytes_consumed: IntCounterVec,

    /// Broker error events seen by the driver
    pub broker_errors: IntCounterVec,

    /// Completed driver runs
    pub runs_finished: IntCounterVec,
}

/// Health reporter metrics
pub struct HealthMetrics {
    /// Health reports handed to the broker
    pub reports_published: CounterVec,

    /// Health reports that could not be handed to the broker
    pub publish_failures: CounterVec,

    /// Failed connectivity probes
    pub probe_failures: CounterVec,
}

lazy_static! {
    pub static ref STREAM_METRICS: StreamMetrics = StreamMetrics {
        messages_consumed: register_int_counter_vec!(
            "stream_messages_consumed_total",
            "Total number of messages consumed",
            &["subscription"]
        )
        .unwrap(),

        bytes_consumed: register_int_counter_vec!(
            "stream_bytes_consumed_total",
            "Total number of payload bytes consumed",
            &["subscription"]
        )
        .unwrap(),

        broker_errors: register_int_counter_vec!(
            "stream_broker_errors_total",
            "Total number of broker error events",
            &["subscription"]
        )
        .unwrap(),

        runs_finished: register_int_counter_vec!(
            "stream_runs_finished_total",
            "Total number of completed consumption runs",
            &["subscription"]
        )
        .unwrap(),
    };

    pub static ref HEALTH_METRICS: HealthMetrics = HealthMetrics {
        reports_published: register_counter_vec!(
            "health_reports_published_total",
            "Total number of health reports published",
            &["service"]
        )
        .unwrap(),

        publish_failures: register_counter_vec!(
            "health_publish_failures_total",
            "Total number of health publish failures",
            &["service", "reason"]
        )
        .unwrap(),

        probe_failures: register_counter_vec!(
            "health_broker_probe_failures_total",
            "Total number of failed broker connectivity probes",
            &["service"]
        )
        .unwrap(),
    };
}

/// Initialize all metrics so they appear in the registry before first use
pub fn init_metrics() {
    lazy_static::initialize(&STREAM_METRICS);
    lazy_static::initialize(&HEALTH_METRICS);
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
