//! Prometheus metrics for chunked uploads.
//!
//! Metrics live in a crate-level registry; embedders call [`register_metrics`]
//! once and expose [`encode`] however they serve metrics.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all upload metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_uploads_started_total",
        "Total number of chunked uploads started",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_upload_failures_total",
        "Total number of chunked uploads that failed",
    )
    .expect("metric creation failed")
});

pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_parts_uploaded_total",
        "Total number of parts written to the object store",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_bytes_uploaded_total",
        "Total bytes written to the object store as parts",
    )
    .expect("metric creation failed")
});

pub static COMPOSE_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_compose_requests_total",
        "Total number of compose requests issued",
    )
    .expect("metric creation failed")
});

// A rising rate means the configured chunk size is too small for the objects
// being uploaded.
pub static COMPOSE_LIMIT_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_compose_limit_hits_total",
        "Total number of uploads that reached the compose request limit",
    )
    .expect("metric creation failed")
});

pub static CLEANUP_DELETES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_cleanup_deletes_total",
        "Total number of intermediate parts deleted",
    )
    .expect("metric creation failed")
});

pub static CLEANUP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_cleanup_failures_total",
        "Total number of intermediate parts that could not be deleted",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stitch_upload_duration_seconds",
            "Time from first read to final object for successful uploads",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PARTS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMPOSE_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMPOSE_LIMIT_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLEANUP_DELETES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLEANUP_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn encode() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_and_encodes() {
        register_metrics();
        register_metrics();
        COMPOSE_LIMIT_HITS.inc();

        let text = encode().unwrap();
        assert!(text.contains("stitch_compose_limit_hits_total"));
        assert!(text.contains("stitch_parts_uploaded_total"));
    }
}
