//! # Controller
//!
//! The reconciliation core and the per-kind reconcilers built on it.
//!
//! ## Sub-modules
//!
//! - `conditions` - Condition sets, Ready aggregation and the condition manager
//! - `tracker` - Lease-based dependency tracker for objects a pass reads but does not own
//! - `children` - Create/update/delete convergence of owned children
//! - `engine` - Fetch, default, delegate and commit skeleton shared by every kind
//! - `kafka_provider`, `adapter`, `processor` - Kind-specific reconcilers

pub mod adapter;
pub mod children;
pub mod conditions;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod kafka_provider;
pub mod labels;
pub mod processor;
pub mod tracker;

pub use adapter::AdapterReconciler;
pub use children::{ChildKind, ChildReconciler};
pub use conditions::{ConditionManager, ConditionSet};
pub use context::Context;
pub use engine::{Engine, Outcome, Parent, ParentReconciler};
pub use error::ReconcilerError;
pub use events::{EventRecorder, EventSeverity, KubeEventRecorder};
pub use kafka_provider::KafkaProviderReconciler;
pub use processor::ProcessorReconciler;
pub use tracker::{LeaseTracker, TrackRequest, Tracker};
