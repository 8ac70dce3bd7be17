use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all engine metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("signals_ingested_total").absolute(0);
    counter!("signals_replayed_total").absolute(0);
    counter!("sessions_created_total").absolute(0);
    counter!("sessions_completed_total").absolute(0);
    counter!("sessions_failed_total").absolute(0);
    counter!("sessions_cancelled_total").absolute(0);
    counter!("risk_rejections_total").absolute(0);
    counter!("replica_retries_total").absolute(0);

    gauge!("active_relationships").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("replication_delay_ms").record(0.0);

    handle
}
