use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Admission outcomes: admitted, unauthenticated, insufficient_credit, charge_failed
pub static ADMISSIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("memegate_admissions_total", "Metered requests by admission outcome"),
        &["outcome"],
    )
    .unwrap()
});

pub static TOKENS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("memegate_tokens_issued_total", "Total number of auth tokens issued").unwrap()
});

pub static TOP_UPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("memegate_top_ups_total", "Total number of successful top-ups").unwrap()
});

pub static CREDITS_ADDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "memegate_credits_added_total",
        "Credits added through top-ups",
    )
    .unwrap()
});

// Upstream metrics
pub static UPSTREAM_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new("memegate_upstream_latency_seconds", "Upstream request latency")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["service"],
    )
    .unwrap()
});

pub static UPSTREAM_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("memegate_upstream_failures_total", "Failed upstream requests"),
        &["service"],
    )
    .unwrap()
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(ADMISSIONS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(TOKENS_ISSUED.clone())).unwrap();
        REGISTRY.register(Box::new(TOP_UPS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(CREDITS_ADDED.clone())).unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_LATENCY.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UPSTREAM_FAILURES.clone()))
            .unwrap();
    });
}
