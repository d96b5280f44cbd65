//! # Processor
//!
//! A Processor runs a function between input and output streams: one
//! Deployment with the function container and a processor sidecar that talks
//! to the stream gateways.

use super::{conditioned_status, Condition, TypedLocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Labels the processor Deployment with its owner's name
pub const PROCESSOR_LABEL_KEY: &str = "streaming.projectriff.io/processor";

pub const PROCESSOR_CONDITION_READY: &str = "Ready";
pub const PROCESSOR_CONDITION_FUNCTION_READY: &str = "FunctionReady";
pub const PROCESSOR_CONDITION_STREAMS_READY: &str = "StreamsReady";
pub const PROCESSOR_CONDITION_DEPLOYMENT_READY: &str = "DeploymentReady";

/// Processor Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: streaming.projectriff.io/v1alpha1
/// kind: Processor
/// metadata:
///   name: square
/// spec:
///   functionRef: square
///   inputs: [numbers]
///   outputs: [squares]
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Processor",
    group = "streaming.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "ProcessorStatus",
    category = "riff",
    printcolumn = r#"{"name":"Function", "type":"string", "jsonPath":".spec.functionRef"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSpec {
    /// Name of the build.projectriff.io Function providing the image
    pub function_ref: String,
    /// Names of the streams to consume
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of the streams to produce to
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
    /// Gateway addresses of the input streams, in `spec.inputs` order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_addresses: Vec<String>,
    /// Gateway addresses of the output streams, in `spec.outputs` order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_ref: Option<TypedLocalObjectReference>,
}

conditioned_status!(ProcessorStatus);
