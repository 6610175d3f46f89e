//! Prometheus metrics for the fan-out pipeline, feed reads and live push

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Duration;

static FANOUT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsfeed_fanout_events_total",
        "Post-created events handled by the fan-out consumer",
        &["outcome"]
    )
    .expect("Failed to register fan-out events metric")
});

static FANOUT_TARGETS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsfeed_fanout_targets_total",
        "Inbox keys written by fan-out, by mode",
        &["mode"]
    )
    .expect("Failed to register fan-out targets metric")
});

static CACHE_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "newsfeed_cache_write_failures_total",
        "Inbox keys whose write still failed after per-key fallback"
    )
    .expect("Failed to register cache write failures metric")
});

static DEAD_LETTERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsfeed_dead_letters_total",
        "Events routed to the dead-letter topic",
        &["reason"]
    )
    .expect("Failed to register dead letters metric")
});

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsfeed_feed_requests_total",
        "Feed page requests by outcome",
        &["outcome"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "newsfeed_feed_latency_seconds",
        "Feed assembly latency",
        &["outcome"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register feed latency metric")
});

static PUSH_FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsfeed_push_frames_total",
        "Live frames by event and result",
        &["event", "result"]
    )
    .expect("Failed to register push frames metric")
});

static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "newsfeed_live_connections",
        "Currently registered live connections"
    )
    .expect("Failed to register live connections metric")
});

pub fn record_fanout_event(outcome: &str) {
    FANOUT_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_fanout_targets(mode: &str, count: usize) {
    FANOUT_TARGETS_TOTAL
        .with_label_values(&[mode])
        .inc_by(count as u64);
}

pub fn record_cache_write_failures(count: usize) {
    CACHE_WRITE_FAILURES_TOTAL.inc_by(count as u64);
}

pub fn record_dead_letter(reason: &str) {
    DEAD_LETTERS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_feed_request(outcome: &str, elapsed: Duration) {
    FEED_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    FEED_LATENCY_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_push_frame(event: &str, delivered: bool) {
    let result = if delivered { "delivered" } else { "dropped" };
    PUSH_FRAMES_TOTAL.with_label_values(&[event, result]).inc();
}

pub fn set_live_connections(count: usize) {
    LIVE_CONNECTIONS.set(count as i64);
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
