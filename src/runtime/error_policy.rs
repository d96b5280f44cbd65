//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! Failed passes retry with per-resource exponential backoff; lost
//! optimistic concurrency races retry promptly without growing it.

use super::watch_loop::Dispatcher;
use crate::controller::{ParentReconciler, ReconcilerError};
use crate::observability::metrics;
use dashmap::DashMap;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-resource exponential backoff, `base` doubling up to `max`
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: DashMap<String, u32>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: DashMap::new(),
        }
    }

    /// Delay before retrying `key` after `error`
    pub fn next_delay(&self, key: &str, error: &ReconcilerError) -> Duration {
        if error.is_conflict() {
            return self.base;
        }
        let mut failures = self.failures.entry(key.to_owned()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Forget the failure streak of `key` after a successful pass
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map_or(0, |f| *f)
    }
}

/// Handle reconciliation errors with exponential backoff
///
/// Backoff state is tracked per resource to avoid cross-resource interference.
pub fn handle_reconciliation_error<R: ParentReconciler>(
    obj: Arc<R::Resource>,
    error: &ReconcilerError,
    dispatcher: Arc<Dispatcher<R>>,
) -> Action {
    let name = obj.meta().name.as_deref().unwrap_or("unknown");
    let namespace = obj.meta().namespace.as_deref().unwrap_or("default");
    let kind = R::Resource::kind(&());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind,
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    let delay = dispatcher
        .backoff
        .next_delay(&format!("{namespace}/{name}"), error);
    let reason = error.metric_label();
    if error.is_conflict() {
        info!("Lost an update race, retrying in {:?}", delay);
    } else {
        warn!(
            "Reconciliation of {} {}/{} failed ({}), retrying in {:?}",
            kind, namespace, name, reason, delay
        );
    }
    metrics::increment_requeues_total(reason);
    Action::requeue(delay)
}

/// Log a failure surfaced by the controller stream
///
/// Reconciler errors were already handled by the error policy; what remains
/// are watch and queue failures, which the runtime retries on its own.
pub fn handle_watch_stream_error(kind: &str, error_string: &str) {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let is_401 = error_string.contains("401") || error_string.contains("Unauthorized");
    let is_403 = error_string.contains("403") || error_string.contains("Forbidden");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired");
    let is_not_found = error_string.contains("404") || error_string.contains("NotFound");

    if is_401 || is_403 {
        error!("Watch not authorized, check the controller's RBAC: {}", error_string);
    } else if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
    } else if is_not_found {
        warn!("Watched kind is not served, is its CRD installed? {}", error_string);
    } else {
        error!("Controller stream error: {}", error_string);
    }
}
