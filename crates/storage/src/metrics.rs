//! Prometheus metrics for the provider cache.
//!
//! Both store backends feed the same process-wide counters; the metrics
//! listener exposes them from [`REGISTRY`]. The size gauge is maintained by
//! deltas and is an approximation, not a ground-truth scan.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::{LazyLock, Once};

/// Registry gathered by the metrics endpoint.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CACHE_HITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cache_hits_total", "Total number of cache hits").expect("metric creation failed")
});

pub static CACHE_MISSES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cache_misses_total", "Total number of cache misses")
        .expect("metric creation failed")
});

pub static CACHE_DELETIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cache_deletions_total", "Total number of cache deletions")
        .expect("metric creation failed")
});

pub static CACHE_SIZE_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("cache_size_bytes", "Current size of the cache in bytes")
        .expect("metric creation failed")
});

pub static CACHE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cache_operations_total",
            "Total number of cache operations by type and status",
        ),
        &["operation", "status"],
    )
    .expect("metric creation failed")
});

pub static CACHE_OPERATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cache_operation_duration_seconds",
            "Time taken to process cache operations",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all cache metrics with [`REGISTRY`].
///
/// Idempotent: subsequent calls are no-ops, so tests and embedded routers can
/// call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_DELETIONS_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_SIZE_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_OPERATIONS_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_OPERATION_DURATION_SECONDS.clone()))
            .expect("metric registration failed");
    });
}

/// Recorder facade the store backends hold.
///
/// All methods write to the process-wide metrics above; the struct exists so
/// backends carry an explicit handle rather than reaching for statics inline.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        CACHE_HITS_TOTAL.inc();
        CACHE_OPERATIONS_TOTAL.with_label_values(&["get", "hit"]).inc();
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        CACHE_MISSES_TOTAL.inc();
        CACHE_OPERATIONS_TOTAL.with_label_values(&["get", "miss"]).inc();
    }

    /// Record `count` deleted entries.
    pub fn record_deletion(&self, count: u64) {
        CACHE_DELETIONS_TOTAL.inc_by(count);
        CACHE_OPERATIONS_TOTAL
            .with_label_values(&["delete", "success"])
            .inc_by(count);
    }

    /// Record an error for an operation.
    pub fn record_error(&self, operation: &str) {
        CACHE_OPERATIONS_TOTAL
            .with_label_values(&[operation, "error"])
            .inc();
    }

    /// Observe the duration of an operation in seconds.
    pub fn observe_duration(&self, operation: &str, seconds: f64) {
        CACHE_OPERATION_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(seconds);
    }

    /// Apply a size delta to the cache size gauge.
    pub fn update_size(&self, delta: i64) {
        CACHE_SIZE_BYTES.add(delta);
    }
}
