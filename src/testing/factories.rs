//! Object factories for reconciler tests.

use crate::crd::external::{stream_gvk, BuildKind, TargetKind};
use crate::crd::{
    Adapter, AdapterSpec, AdapterTarget, Build, KafkaProvider, KafkaProviderSpec, Processor, ProcessorSpec,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{ApiResource, DynamicObject};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn kafka_provider(namespace: &str, name: &str, bootstrap_servers: &str) -> KafkaProvider {
    let mut provider = KafkaProvider::new(
        name,
        KafkaProviderSpec {
            bootstrap_servers: bootstrap_servers.to_owned(),
        },
    );
    provider.metadata.namespace = Some(namespace.to_owned());
    provider
}

/// Adapter from the function `function` to the Knative Service `service`
pub fn adapter(namespace: &str, name: &str, function: &str, service: &str) -> Adapter {
    let mut adapter = Adapter::new(
        name,
        AdapterSpec {
            build: Build {
                function_ref: Some(function.to_owned()),
                ..Build::default()
            },
            target: AdapterTarget {
                service_ref: Some(service.to_owned()),
                ..AdapterTarget::default()
            },
        },
    );
    adapter.metadata.namespace = Some(namespace.to_owned());
    adapter
}

pub fn processor(namespace: &str, name: &str, function: &str, inputs: &[&str], outputs: &[&str]) -> Processor {
    let mut processor = Processor::new(
        name,
        ProcessorSpec {
            function_ref: function.to_owned(),
            inputs: inputs.iter().map(|s| (*s).to_owned()).collect(),
            outputs: outputs.iter().map(|s| (*s).to_owned()).collect(),
        },
    );
    processor.metadata.namespace = Some(namespace.to_owned());
    processor
}

pub fn config_map(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..ConfigMap::default()
    }
}

/// A build resource with an optional latest image and Ready status
pub fn build(
    kind: BuildKind,
    namespace: &str,
    name: &str,
    latest_image: Option<&str>,
    ready: Option<&str>,
) -> DynamicObject {
    let mut status = serde_json::Map::new();
    if let Some(image) = latest_image {
        status.insert("latestImage".to_owned(), json!(image));
    }
    if let Some(ready) = ready {
        status.insert("conditions".to_owned(), json!([{"type": "Ready", "status": ready}]));
    }
    DynamicObject::new(name, &ApiResource::from_gvk(&kind.gvk()))
        .within(namespace)
        .data(json!({"spec": {}, "status": Value::Object(status)}))
}

/// A Knative Service or Configuration whose first container runs `image`
pub fn knative_target(kind: TargetKind, namespace: &str, name: &str, image: &str) -> DynamicObject {
    DynamicObject::new(name, &ApiResource::from_gvk(&kind.gvk()))
        .within(namespace)
        .data(json!({
            "spec": {
                "template": {
                    "metadata": {"annotations": {"autoscaling.knative.dev/minScale": "1"}},
                    "spec": {"containers": [{"image": image, "env": [{"name": "MODE", "value": "fast"}]}]}
                },
                "traffic": [{"percent": 100, "latestRevision": true}]
            }
        }))
}

/// A Stream, ready when `gateway` is set
pub fn stream(namespace: &str, name: &str, gateway: Option<&str>) -> DynamicObject {
    let status = gateway.map_or_else(|| json!({}), |gateway| json!({"address": {"gateway": gateway}}));
    DynamicObject::new(name, &ApiResource::from_gvk(&stream_gvk()))
        .within(namespace)
        .data(json!({"spec": {"provider": "franz"}, "status": status}))
}

/// `deployment` with an `Available` condition of the given status
pub fn with_available(mut deployment: Deployment, status: &str) -> Deployment {
    deployment.status = Some(DeploymentStatus {
        conditions: Some(vec![DeploymentCondition {
            type_: "Available".to_owned(),
            status: status.to_owned(),
            reason: Some("MinimumReplicasAvailable".to_owned()),
            message: Some("Deployment has minimum availability.".to_owned()),
            ..DeploymentCondition::default()
        }]),
        ..DeploymentStatus::default()
    });
    deployment
}
