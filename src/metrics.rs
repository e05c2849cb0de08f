// Prometheus metrics for the pingboard service
//
// Exposes metrics on /metrics HTTP endpoint:
// - Rate-limited action outcomes (counter)
// - Authentication failures (counter)
// - Sessions issued (counter)
// - Store errors and round-trip latency per operation

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Action metrics
    pub static ref PING_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("ping_requests_total", "Rate-limited action requests by outcome"),
        &["outcome"]
    ).expect("Failed to create ping requests metric");

    // Session metrics
    pub static ref AUTH_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "auth_failures_total",
        "Total number of rejected logins and session validations"
    ).expect("Failed to create auth failures metric");

    pub static ref SESSIONS_ISSUED_TOTAL: IntCounter = IntCounter::new(
        "sessions_issued_total",
        "Total number of sessions issued since start"
    ).expect("Failed to create sessions issued metric");

    // Store metrics
    pub static ref STORE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("store_errors_total", "Shared state store failures by operation"),
        &["operation"]
    ).expect("Failed to create store errors metric");

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "store_operation_duration_seconds",
            "Shared state store round-trip duration"
        ).buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["operation"]
    ).expect("Failed to create store duration metric");

    // Read-path snapshots
    pub static ref DISTINCT_CALLERS_ESTIMATE: IntGauge = IntGauge::new(
        "distinct_callers_estimate",
        "Last distinct-caller estimate served"
    ).expect("Failed to create distinct callers metric");
}

static INIT: Once = Once::new();

/// Register every metric with [`REGISTRY`]
///
/// Safe to call more than once; registration only happens the first time.
pub fn init() -> prometheus::Result<()> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = register_all();
    });
    outcome
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(PING_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AUTH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SESSIONS_ISSUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(DISTINCT_CALLERS_ESTIMATE.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
