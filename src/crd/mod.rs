//! # Custom Resource Definitions
//!
//! CRD types for the riff system controller.
//!
//! - [`KafkaProvider`] - gateway and provisioner for a Kafka cluster
//! - [`Adapter`] - pushes a built image into a Knative Service or Configuration
//! - [`Processor`] - runs a function between streams
//!
//! [`external`] describes the kinds that are read but never owned.

mod adapter;
mod condition;
pub mod external;
mod kafka_provider;
mod processor;
mod refs;

pub use adapter::*;
pub(crate) use condition::conditioned_status;
pub use condition::{Condition, ConditionStatus, ConditionedStatus};
pub use kafka_provider::*;
pub use processor::*;
pub use refs::TypedLocalObjectReference;
