//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use super::server::{start_server, ServerState};
use crate::config::{load_config, ServerConfig};
use crate::controller::{Context, KubeEventRecorder, LeaseTracker, Tracker};
use crate::crd::{Adapter, KafkaProvider, Processor};
use crate::observability;
use crate::store::{KubeStore, TypedClient};
use anyhow::{anyhow, Context as _, Result};
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Shared reconciler context
    pub context: Context,
    /// Concrete tracker, for the GC tick and the watch mappers
    pub tracker: Arc<LeaseTracker>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("context", &self.context)
            .field("tracker", &self.tracker)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Store, tracker and event recorder wiring
pub async fn initialize() -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_installed| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riff_system_controller=info".into()),
        )
        .init();

    info!("Starting riff System Controller v{}", env!("CARGO_PKG_VERSION"));

    let (controller_config, server_config) = load_config();
    info!(
        system_namespace = %controller_config.system_namespace,
        resync_period = ?controller_config.resync_period,
        tracker_lease = ?controller_config.tracker_lease(),
        reconcile_timeout = ?controller_config.reconcile_timeout,
        concurrency = controller_config.reconcile_concurrency,
        "Loaded controller configuration"
    );

    // Initialize metrics
    observability::metrics::register_metrics()?;

    // Start HTTP server for metrics and probes
    // We start it in a background task but wait for it to be ready before proceeding
    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let server_state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, server_state).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let tracker = Arc::new(LeaseTracker::new(controller_config.tracker_lease()));
    let context = Context::new(
        TypedClient::new(Arc::new(KubeStore::new(client.clone()))),
        Arc::clone(&tracker) as Arc<dyn Tracker>,
        Arc::new(KubeEventRecorder::new(client.clone())),
        Arc::new(controller_config),
    );

    check_crds_queryable(&client).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        context,
        tracker,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        // Check if server is ready (set by start_server once bound)
        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log how many parents of each kind exist, or warn when a CRD is not installed
///
/// Existing parents are picked up by the controllers' initial list, so this is
/// a diagnostic only and never fails startup.
async fn check_crds_queryable(client: &Client) {
    async fn count<K>(client: &Client)
    where
        K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
    {
        let kind = K::kind(&());
        match Api::<K>::all(client.clone()).list(&ListParams::default()).await {
            Ok(list) => info!(kind = %kind, count = list.items.len(), "CRD is queryable"),
            Err(e) => {
                warn!(kind = %kind, error = %e, "CRD is not queryable. Is the CRD installed?");
                warn!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            }
        }
    }

    count::<KafkaProvider>(client).await;
    count::<Adapter>(client).await;
    count::<Processor>(client).await;
}
