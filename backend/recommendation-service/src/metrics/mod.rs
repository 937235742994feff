//! Recommender Metrics
//!
//! Prometheus metrics separating "no recommendations" from "system error",
//! which callers cannot tell apart.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Duration;

static RECOMMENDATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommender_requests_total",
        "Recommendation requests by outcome (served or empty reason)",
        &["outcome"]
    )
    .expect("Failed to register recommender requests metric")
});

static TRAINING_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommender_training_runs_total",
        "Training runs by status (success/skipped/error)",
        &["status"]
    )
    .expect("Failed to register recommender training runs metric")
});

static TRAINING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "recommender_training_duration_seconds",
        "Wall time of successful training runs",
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("Failed to register recommender training duration metric")
});

static MODEL_RELOADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "recommender_model_reloads_total",
        "Times the model cache loaded artifacts from disk"
    )
    .expect("Failed to register recommender model reloads metric")
});

static MODEL_ITEMS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "recommender_model_items",
        "Products in the currently loaded model"
    )
    .expect("Failed to register recommender model items metric")
});

/// Record a recommendation outcome ("served" or an empty reason label)
pub fn record_recommendation(outcome: &str) {
    RECOMMENDATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a training run result
pub fn record_training_run(status: &str) {
    TRAINING_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_training_duration(duration: Duration) {
    TRAINING_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a cache reload and the size of the loaded model
pub fn record_model_reload(items: usize) {
    MODEL_RELOADS_TOTAL.inc();
    MODEL_ITEMS.set(items as i64);
}

/// Render the default registry in text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
