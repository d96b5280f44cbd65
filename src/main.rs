//! # riff System Controller
//!
//! A Kubernetes controller for riff's streaming and knative runtimes.
//!
//! ## Overview
//!
//! 1. **KafkaProvider** - Runs a liiklus gateway and a stream provisioner for a Kafka cluster
//! 2. **Adapter** - Rolls the latest image of a build into an existing Knative Service or Configuration
//! 3. **Processor** - Runs a function between input and output streams with a processor sidecar
//!
//! ## Features
//!
//! - **Dependency tracking**: objects a reconciliation reads but does not own re-trigger it when they change
//! - **Owned children**: Deployments and Services are converged idempotently, preserving fields other actors own
//! - **Status conditions**: leaf conditions aggregate into `Ready` with deterministic precedence
//! - **Prometheus metrics** and **health probes** over HTTP

use anyhow::Result;
use riff_system_controller::runtime::initialization::initialize;
use riff_system_controller::runtime::watch_loop::run_watch_loop;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime
    let init_result = initialize().await?;

    // Run the watch loop until a shutdown signal arrives
    let cancel = CancellationToken::new();
    run_watch_loop(
        init_result.client,
        init_result.context,
        init_result.tracker,
        cancel,
    )
    .await;

    info!("Controller shut down");
    Ok(())
}
