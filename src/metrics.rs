// Prometheus metrics definitions for the snake backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Sessions currently being simulated (0 or 1, one runner per process).
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("snake_active_sessions", "Sessions currently being simulated").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total sessions opened.
    pub static ref SESSIONS_STARTED_TOTAL: IntCounter = IntCounter::new(
        "snake_sessions_started_total",
        "Total sessions opened",
    )
    .unwrap();

    /// Total sessions closed, by terminal status.
    pub static ref SESSIONS_ENDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snake_sessions_ended_total", "Total sessions closed"),
        &["status"],
    )
    .unwrap();

    /// Total items consumed, by kind.
    pub static ref ITEMS_EATEN_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snake_items_eaten_total", "Total items consumed"),
        &["kind"],
    )
    .unwrap();

    /// Persistence writes that failed and were dropped.
    pub static ref STORE_WRITE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "snake_store_write_failures_total",
        "Persistence writes that failed",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Per-tick processing time in milliseconds.
    pub static ref TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("snake_tick_duration_ms", "Per-tick processing time in ms")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(SESSIONS_STARTED_TOTAL.clone()),
        Box::new(SESSIONS_ENDED_TOTAL.clone()),
        Box::new(ITEMS_EATEN_TOTAL.clone()),
        Box::new(STORE_WRITE_FAILURES_TOTAL.clone()),
        Box::new(TICK_DURATION_MS.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
