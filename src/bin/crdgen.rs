//! Print the CustomResourceDefinitions of the reconciled kinds as YAML
//!
//! Usage:
//!   cargo run --bin crdgen > config/crd/riff.yaml

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use riff_system_controller::{Adapter, KafkaProvider, Processor};

fn main() -> Result<()> {
    let crds = [KafkaProvider::crd(), Adapter::crd(), Processor::crd()];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).context("Failed to serialize CRD")?;
        println!("---");
        print!("{yaml}");
    }
    Ok(())
}
