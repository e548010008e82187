//! Sync engine metrics following Prometheus naming conventions

use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref SYNC_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        opts!(
            "mcpsync_sync_attempts_total",
            "Total number of sync attempts"
        ),
        &["registry", "outcome"] // success, failure, skipped
    )
    .unwrap();

    pub static ref SYNC_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        histogram_opts!(
            "mcpsync_sync_duration_seconds",
            "Duration of sync attempts in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        ),
        &["registry"]
    )
    .unwrap();

    pub static ref SYNCED_SERVERS: GaugeVec = register_gauge_vec!(
        opts!(
            "mcpsync_synced_servers",
            "Servers stored by the most recent successful sync"
        ),
        &["registry"]
    )
    .unwrap();

    pub static ref FETCH_BYTES_TOTAL: CounterVec = register_counter_vec!(
        opts!(
            "mcpsync_fetch_bytes_total",
            "Bytes downloaded from upstream sources"
        ),
        &["source"]
    )
    .unwrap();
}

/// Axum handler serving the text exposition format.
pub async fn prometheus_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(%err, "failed to encode metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            String::new(),
        )
            .into_response();
    }

    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
