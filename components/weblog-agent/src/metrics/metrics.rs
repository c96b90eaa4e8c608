// External crates
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder, register_histogram,
    register_int_counter, register_int_counter_vec,
};
use std::time::Instant;

/// Helper to observe histogram duration
pub fn observe_duration(hist: &Histogram, start: Instant) {
    hist.observe(start.elapsed().as_secs_f64());
}

lazy_static! {
    // ======== Pipeline Metrics ========

    /// Lines handled by the ingest task, by outcome
    /// (`accepted`, `filtered`, `unmatched`).
    pub static ref LINES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "weblog_lines_total",
        "Log lines handled by the ingest task, by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref PROCESS_LINE_DURATION_SECONDS: Histogram = register_histogram!(
        "weblog_process_line_duration_seconds",
        "Histogram of per-line parse, filter, classify and record durations in seconds",
        vec![0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001]
    ).unwrap();

    // ======== Collection Metrics ========

    /// Time the ingest task stays paused for one collection
    pub static ref COLLECT_DURATION_SECONDS: Histogram = register_histogram!(
        "weblog_collect_duration_seconds",
        "Histogram of collection (pause, snapshot, reset, resume) durations in seconds",
        vec![0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1]
    ).unwrap();

    // ======== Tailer Metrics ========

    pub static ref TAIL_REOPENS_TOTAL: IntCounter = register_int_counter!(
        "weblog_tail_reopens_total",
        "Number of times the tailed file was reopened after rotation or truncation"
    ).unwrap();
}

/// Render the default registry in Prometheus text format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode self metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
