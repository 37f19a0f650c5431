use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const BATCHES_SENT: &str = "cblock_batches_sent_total";
pub const ROWS_SENT: &str = "cblock_rows_sent_total";
pub const SEND_DURATION: &str = "cblock_send_duration_seconds";

/// Installs a global Prometheus recorder. The handle renders the current
/// snapshot in text exposition format.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(SEND_DURATION.to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Records one successful batch send of `rows` rows.
pub fn record_batch_sent(rows: usize, duration: Duration) {
    ::metrics::increment_counter!(BATCHES_SENT);
    ::metrics::counter!(ROWS_SENT, rows as u64);
    ::metrics::histogram!(SEND_DURATION, duration.as_secs_f64());
}
