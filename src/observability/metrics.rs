//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `governance_addon_reconciliations_total{reconciler}` - Total number of reconciliations
//! - `governance_addon_reconciliation_errors_total{reconciler}` - Total number of failed reconciliations
//! - `governance_addon_reconciliation_duration_seconds{reconciler}` - Duration of reconciliations
//! - `governance_addon_watch_events_total{kind}` - Watch events received per watched kind

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "governance_addon_reconciliations_total",
            "Total number of reconciliations by reconciler",
        ),
        &["reconciler"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "governance_addon_reconciliation_errors_total",
            "Total number of failed reconciliations by reconciler",
        ),
        &["reconciler"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "governance_addon_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds by reconciler",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["reconciler"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "governance_addon_watch_events_total",
            "Total number of watch events received by watched kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_EVENTS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when called twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(WATCH_EVENTS_TOTAL.clone()))?;

    Ok(())
}

/// Record one finished reconcile
pub fn observe_reconciliation(reconciler: &str, duration_secs: f64, ok: bool) {
    RECONCILIATIONS_TOTAL.with_label_values(&[reconciler]).inc();
    RECONCILIATION_DURATION
        .with_label_values(&[reconciler])
        .observe(duration_secs);
    if !ok {
        RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&[reconciler])
            .inc();
    }
}

pub fn increment_watch_events(kind: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}
