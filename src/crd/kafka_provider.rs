//! # KafkaProvider
//!
//! A KafkaProvider expands into a liiklus gateway and a stream provisioner,
//! each a Deployment plus a Service, pointed at one Kafka cluster.

use super::{conditioned_status, Condition, TypedLocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Labels every child with the owning provider's name
pub const KAFKA_PROVIDER_LABEL_KEY: &str = "streaming.projectriff.io/kafka-provider";
/// Role label for gateway children
pub const KAFKA_PROVIDER_GATEWAY_LABEL_KEY: &str = "streaming.projectriff.io/kafka-provider-gateway";
/// Role label for provisioner children
pub const KAFKA_PROVIDER_PROVISIONER_LABEL_KEY: &str =
    "streaming.projectriff.io/kafka-provider-provisioner";
/// Marks provisioner children with the provider technology
pub const PROVISIONER_LABEL_KEY: &str = "streaming.projectriff.io/provisioner";

pub const KAFKA_PROVIDER_CONDITION_READY: &str = "Ready";
pub const KAFKA_PROVIDER_CONDITION_GATEWAY_DEPLOYMENT_READY: &str = "GatewayDeploymentReady";
pub const KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY: &str = "GatewayServiceReady";
pub const KAFKA_PROVIDER_CONDITION_PROVISIONER_DEPLOYMENT_READY: &str =
    "ProvisionerDeploymentReady";
pub const KAFKA_PROVIDER_CONDITION_PROVISIONER_SERVICE_READY: &str = "ProvisionerServiceReady";

/// KafkaProvider Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: streaming.projectriff.io/v1alpha1
/// kind: KafkaProvider
/// metadata:
///   name: franz
///   namespace: default
/// spec:
///   bootstrapServers: kafka.kafka:9092
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KafkaProvider",
    group = "streaming.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "KafkaProviderStatus",
    shortname = "kafka-provider",
    category = "riff",
    printcolumn = r#"{"name":"Bootstrap Servers", "type":"string", "jsonPath":".spec.bootstrapServers"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaProviderSpec {
    /// Kafka bootstrap servers, `host:port[,host:port]`
    pub bootstrap_servers: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaProviderStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_deployment_ref: Option<TypedLocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_service_ref: Option<TypedLocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner_deployment_ref: Option<TypedLocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner_service_ref: Option<TypedLocalObjectReference>,
}

conditioned_status!(KafkaProviderStatus);
