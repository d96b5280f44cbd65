//! # Constants
//!
//! Default values shared by configuration, runtime and reconcilers.

/// Field manager / reporting controller name
pub const CONTROLLER_NAME: &str = "riff-system-controller";

/// Namespace the controller's own configuration lives in
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "riff-system";

/// Resync period: every parent is re-reconciled at least this often
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 10 * 60 * 60;

/// Tracker lease is this multiple of the resync period
pub const DEFAULT_TRACKER_LEASE_FACTOR: u32 = 3;

/// How often expired tracker leases are pruned
pub const DEFAULT_TRACKER_GC_INTERVAL_SECS: u64 = 60;

/// Upper bound for a single reconciliation pass
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// First retry delay after a failed pass
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;

/// Retry delay cap after repeated failures
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 5 * 60;

/// Number of passes run in parallel per parent kind
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;

/// ConfigMap holding the gateway and provisioner images
pub const DEFAULT_KAFKA_PROVIDER_IMAGES_CONFIGMAP: &str = "riff-streaming-kafka-provider";

/// ConfigMap holding the processor sidecar image
pub const DEFAULT_PROCESSOR_IMAGES_CONFIGMAP: &str = "riff-streaming-processor";

/// HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// How long to wait for the HTTP server to bind
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

