//! # Controller Metrics
//!
//! Metrics for controller operations: reconciliations, owned children,
//! status commits, requeues and the dependency tracker.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_reconciliations_total", "Total number of reconciliations"),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "riff_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_requeues_total", "Total number of reconciliation requeues"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

// Owned child and status metrics
static CHILD_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_child_operations_total",
            "Owned child creates, updates and deletes",
        ),
        &["kind", "verb"],
    )
    .expect("Failed to create CHILD_OPERATIONS_TOTAL metric - this should never happen")
});

static STATUS_UPDATES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_status_updates_total", "Committed status updates"),
        &["kind"],
    )
    .expect("Failed to create STATUS_UPDATES_TOTAL metric - this should never happen")
});

// Tracker metrics
static TRACKER_PRUNED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "riff_tracker_pruned_total",
        "Expired dependency registrations removed by garbage collection",
    )
    .expect("Failed to create TRACKER_PRUNED_TOTAL metric - this should never happen")
});

static TRACKER_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("riff_tracker_entries", "Tracked objects with live dependents")
        .expect("Failed to create TRACKER_ENTRIES metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILD_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKER_PRUNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKER_ENTRIES.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_child_operations(kind: &str, verb: &str) {
    CHILD_OPERATIONS_TOTAL.with_label_values(&[kind, verb]).inc();
}

pub fn increment_status_updates(kind: &str) {
    STATUS_UPDATES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_tracker_pruned(count: usize) {
    TRACKER_PRUNED_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}

pub fn set_tracker_entries(count: usize) {
    TRACKER_ENTRIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}
