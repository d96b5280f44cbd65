//! riff System Controller Library
//!
//! Reconciles riff streaming and knative custom resources (`KafkaProvider`,
//! `Adapter`, `Processor`) into the Deployments and Services they own, and
//! reflects what it observes back into status conditions.
//!
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;
pub mod testing;

// Re-export CRD types for convenience
pub use crd::*;
