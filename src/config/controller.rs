//! # Controller Configuration
//!
//! Reconciliation timing, tracker leases, retry backoff and the names of the
//! ConfigMaps the reconcilers read images from.

use super::{env_var_or_default, parse_duration};
use crate::constants::*;
use std::time::Duration;
use tracing::warn;

/// Controller configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace holding the controller's own ConfigMaps
    pub system_namespace: String,
    /// Every parent is reconciled at least this often, independent of watch events
    pub resync_period: Duration,
    /// Tracker lease as a multiple of the resync period
    pub tracker_lease_factor: u32,
    /// How often expired tracker entries are pruned
    pub tracker_gc_interval: Duration,
    /// Upper bound for a single reconciliation pass
    pub reconcile_timeout: Duration,
    /// First retry delay after a failed pass
    pub backoff_base: Duration,
    /// Retry delay cap
    pub backoff_max: Duration,
    /// Passes run in parallel per parent kind
    pub reconcile_concurrency: u16,
    /// ConfigMap with `gatewayImage` and `provisionerImage`
    pub kafka_provider_images_config_map: String,
    /// ConfigMap with `processorImage`
    pub processor_images_config_map: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_owned(),
            resync_period: Duration::from_secs(DEFAULT_RESYNC_PERIOD_SECS),
            tracker_lease_factor: DEFAULT_TRACKER_LEASE_FACTOR,
            tracker_gc_interval: Duration::from_secs(DEFAULT_TRACKER_GC_INTERVAL_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            backoff_base: Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            kafka_provider_images_config_map: DEFAULT_KAFKA_PROVIDER_IMAGES_CONFIGMAP.to_owned(),
            processor_images_config_map: DEFAULT_PROCESSOR_IMAGES_CONFIGMAP.to_owned(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            system_namespace: env_var_or_default("SYSTEM_NAMESPACE", defaults.system_namespace),
            resync_period: duration_var_or_default("RESYNC_PERIOD", defaults.resync_period),
            tracker_lease_factor: env_var_or_default(
                "TRACKER_LEASE_FACTOR",
                defaults.tracker_lease_factor,
            )
            .max(1),
            tracker_gc_interval: duration_var_or_default(
                "TRACKER_GC_INTERVAL",
                defaults.tracker_gc_interval,
            ),
            reconcile_timeout: duration_var_or_default(
                "RECONCILE_TIMEOUT",
                defaults.reconcile_timeout,
            ),
            backoff_base: duration_var_or_default("BACKOFF_BASE", defaults.backoff_base),
            backoff_max: duration_var_or_default("BACKOFF_MAX", defaults.backoff_max),
            reconcile_concurrency: env_var_or_default(
                "RECONCILE_CONCURRENCY",
                defaults.reconcile_concurrency,
            )
            .max(1),
            kafka_provider_images_config_map: env_var_or_default(
                "KAFKA_PROVIDER_IMAGES_CONFIGMAP",
                defaults.kafka_provider_images_config_map,
            ),
            processor_images_config_map: env_var_or_default(
                "PROCESSOR_IMAGES_CONFIGMAP",
                defaults.processor_images_config_map,
            ),
        }
    }

    /// How long a tracked dependency stays registered without being renewed
    pub fn tracker_lease(&self) -> Duration {
        self.resync_period
            .saturating_mul(self.tracker_lease_factor)
    }
}

fn duration_var_or_default(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(value) => match parse_duration(&value) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Ignoring {}={:?}: {}, using default {:?}", key, value, e, default);
                default
            }
        },
        Err(_) => default,
    }
}
