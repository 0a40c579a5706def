//! Prometheus metrics registry and metric definitions, covering feed
//! fetch, the extractor's concurrency footprint, pool circuit state, and
//! reasoning-graph node calls.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global registry under the crate namespace.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("osint_pipeline".into()), None).expect("failed to create Prometheus registry")
});

/// Total feed fetch attempts (C6).
pub static FEEDS_FETCHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("feeds_fetched_total", "Total number of feed fetch attempts"))
        .expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Histogram of feed fetch+parse durations.
pub static FEED_FETCH_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "feed_fetch_duration_seconds",
        "Duration of feed fetch+parse in seconds",
    ))
    .expect("histogram opts");
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

/// Extractions currently holding the extractor's global semaphore (C5).
pub static EXTRACTOR_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new("extractor_inflight", "Extractions currently in flight")).expect("gauge opts");
    REGISTRY.register(Box::new(g.clone())).unwrap();
    g
});

/// Extractions that gave up after exhausting the retry policy.
pub static EXTRACTOR_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("extractor_failures_total", "Extractions that gave up after retries"))
        .expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Reasoning-graph node invocations, labeled by node name (C11).
pub static GRAPH_NODE_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("graph_node_calls_total", "Reasoning graph node invocations"),
        &["node"],
    )
    .expect("counter vec opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Circuit-breaker state per pool (1 = at least one endpoint circuit
/// open, 0 = all healthy), labeled by pool name (C9).
pub static POOL_CIRCUIT_OPEN: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("pool_circuit_open", "Whether any endpoint in the pool has an open circuit"),
        &["pool"],
    )
    .expect("gauge vec opts");
    REGISTRY.register(Box::new(g.clone())).unwrap();
    g
});

/// Entries written or updated by a completed source ingestion run (C7).
pub static ENTRIES_INGESTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("entries_ingested_total", "Entries written or updated across all sources"))
        .expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Entries successfully run through the reasoning graph by `classify` (C12).
pub static CLASSIFY_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("classify_processed_total", "Entries successfully classified"))
        .expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Entries whose reasoning graph run errored out (C12).
pub static CLASSIFY_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("classify_errors_total", "Entries whose classification run errored"))
        .expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

/// Encode all registered metrics as Prometheus text exposition.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let mf = REGISTRY.gather();
    encoder.encode(&mf, &mut buffer).expect("failed to encode");
    String::from_utf8(buffer).expect("invalid utf8")
}
