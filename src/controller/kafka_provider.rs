//! # KafkaProvider Reconciler
//!
//! Expands a KafkaProvider into a liiklus gateway and a stream provisioner,
//! each a Deployment fronted by a Service. Images come from a ConfigMap in
//! the system namespace, which is tracked so an image bump re-converges
//! every provider.

use super::children::{propagate_deployment_available, ChildReconciler};
use super::conditions::ConditionSet;
use super::context::Context;
use super::engine::{Outcome, Parent, ParentReconciler};
use super::error::ReconcilerError;
use super::labels::{child_labels, controller_index_field};
use crate::crd::{
    KafkaProvider, KafkaProviderStatus, TypedLocalObjectReference, KAFKA_PROVIDER_CONDITION_GATEWAY_DEPLOYMENT_READY,
    KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY, KAFKA_PROVIDER_CONDITION_PROVISIONER_DEPLOYMENT_READY,
    KAFKA_PROVIDER_CONDITION_PROVISIONER_SERVICE_READY, KAFKA_PROVIDER_CONDITION_READY,
    KAFKA_PROVIDER_GATEWAY_LABEL_KEY, KAFKA_PROVIDER_LABEL_KEY, KAFKA_PROVIDER_PROVISIONER_LABEL_KEY,
    PROVISIONER_LABEL_KEY,
};
use crate::store::{gvk_of, IndexRegistry, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tracing::{debug, error};

pub const GATEWAY_IMAGE_KEY: &str = "gatewayImage";
pub const PROVISIONER_IMAGE_KEY: &str = "provisionerImage";
pub const GATEWAY_PORT: i32 = 6565;

impl Parent for KafkaProvider {
    type Status = KafkaProviderStatus;

    const CONDITIONS: ConditionSet = ConditionSet::new(
        KAFKA_PROVIDER_CONDITION_READY,
        &[
            KAFKA_PROVIDER_CONDITION_GATEWAY_DEPLOYMENT_READY,
            KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY,
            KAFKA_PROVIDER_CONDITION_PROVISIONER_DEPLOYMENT_READY,
            KAFKA_PROVIDER_CONDITION_PROVISIONER_SERVICE_READY,
        ],
    );

    fn status(&self) -> Option<&KafkaProviderStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut KafkaProviderStatus {
        self.status.get_or_insert_with(KafkaProviderStatus::default)
    }
}

#[derive(Debug)]
pub struct KafkaProviderReconciler {
    deployment_index: String,
    service_index: String,
}

impl KafkaProviderReconciler {
    pub fn new() -> Self {
        Self {
            deployment_index: controller_index_field("KafkaProvider", "Deployment"),
            service_index: controller_index_field("KafkaProvider", "Service"),
        }
    }
}

impl Default for KafkaProviderReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParentReconciler for KafkaProviderReconciler {
    type Resource = KafkaProvider;

    fn register_indexes(&self, indexes: &IndexRegistry) {
        let owner = gvk_of::<KafkaProvider>();
        indexes.register_controller_owner(&gvk_of::<Deployment>(), self.deployment_index.as_str(), &owner);
        indexes.register_controller_owner(&gvk_of::<Service>(), self.service_index.as_str(), &owner);
    }

    async fn reconcile(&self, ctx: &Context, provider: &mut KafkaProvider) -> Result<Outcome, ReconcilerError> {
        let dependent = provider.key()?;
        let images_namespace = ctx.config.system_namespace.as_str();
        let images_name = ctx.config.kafka_provider_images_config_map.as_str();
        let images = match ctx
            .track_and_get::<ConfigMap>(&dependent, images_namespace, images_name)
            .await
        {
            Ok(images) => images,
            Err(StoreError::NotFound { .. }) => {
                error!(config_map = images_name, "Images ConfigMap not found");
                return Err(ReconcilerError::missing_configuration(format!(
                    "ConfigMap {images_namespace}/{images_name} with kafka provider images"
                )));
            }
            Err(e) => {
                error!(error = %e, "Unable to look up images ConfigMap");
                return Err(e.into());
            }
        };

        let gateway_deployment = {
            let parent = &*provider;
            ChildReconciler::<KafkaProvider, Deployment>::new(
                ctx,
                parent,
                "gateway",
                KAFKA_PROVIDER_GATEWAY_LABEL_KEY,
                &self.deployment_index,
            )?
            .reconcile(|| {
                let image = image(&images, GATEWAY_IMAGE_KEY, "gateway image configuration")?;
                Ok(Some(desired_gateway_deployment(parent, &image)))
            })
            .await?
        };
        if let Some(deployment) = &gateway_deployment {
            provider.status_mut().gateway_deployment_ref = TypedLocalObjectReference::for_object(deployment);
            propagate_deployment_available(
                &mut provider.conditions(),
                KAFKA_PROVIDER_CONDITION_GATEWAY_DEPLOYMENT_READY,
                deployment,
            );
        }

        let gateway_service = {
            let parent = &*provider;
            ChildReconciler::<KafkaProvider, Service>::new(
                ctx,
                parent,
                "gateway",
                KAFKA_PROVIDER_GATEWAY_LABEL_KEY,
                &self.service_index,
            )?
            .reconcile(|| Ok(Some(desired_gateway_service(parent))))
            .await?
        };
        let Some(gateway_service) = gateway_service else {
            return Ok(Outcome::Done);
        };
        provider.status_mut().gateway_service_ref = TypedLocalObjectReference::for_object(&gateway_service);
        provider
            .conditions()
            .mark_true(KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY);
        let gateway_address = format!(
            "{}.{}:{GATEWAY_PORT}",
            gateway_service.metadata.name.as_deref().unwrap_or_default(),
            provider.require_namespace()?,
        );

        let provisioner_deployment = {
            let parent = &*provider;
            ChildReconciler::<KafkaProvider, Deployment>::new(
                ctx,
                parent,
                "provisioner",
                KAFKA_PROVIDER_PROVISIONER_LABEL_KEY,
                &self.deployment_index,
            )?
            .reconcile(|| {
                let image = image(&images, PROVISIONER_IMAGE_KEY, "provisioner image configuration")?;
                Ok(Some(desired_provisioner_deployment(parent, &image, &gateway_address)))
            })
            .await?
        };
        if let Some(deployment) = &provisioner_deployment {
            provider.status_mut().provisioner_deployment_ref = TypedLocalObjectReference::for_object(deployment);
            propagate_deployment_available(
                &mut provider.conditions(),
                KAFKA_PROVIDER_CONDITION_PROVISIONER_DEPLOYMENT_READY,
                deployment,
            );
        }

        let provisioner_service = {
            let parent = &*provider;
            ChildReconciler::<KafkaProvider, Service>::new(
                ctx,
                parent,
                "provisioner",
                KAFKA_PROVIDER_PROVISIONER_LABEL_KEY,
                &self.service_index,
            )?
            .reconcile(|| Ok(Some(desired_provisioner_service(parent))))
            .await?
        };
        if let Some(service) = &provisioner_service {
            provider.status_mut().provisioner_service_ref = TypedLocalObjectReference::for_object(service);
            provider
                .conditions()
                .mark_true(KAFKA_PROVIDER_CONDITION_PROVISIONER_SERVICE_READY);
        }

        debug!("KafkaProvider children converged");
        Ok(Outcome::Done)
    }
}

fn image(images: &ConfigMap, key: &str, what: &str) -> Result<String, ReconcilerError> {
    images
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .filter(|image| !image.is_empty())
        .cloned()
        .ok_or_else(|| ReconcilerError::missing_configuration(what))
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        value_from: None,
    }
}

fn selector(key: &str, value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(key.to_owned(), value.to_owned())])
}

fn name_of(provider: &KafkaProvider) -> &str {
    provider.metadata.name.as_deref().unwrap_or_default()
}

fn gateway_labels(provider: &KafkaProvider) -> BTreeMap<String, String> {
    let name = name_of(provider);
    child_labels(
        provider,
        &[
            (KAFKA_PROVIDER_LABEL_KEY, name),
            (KAFKA_PROVIDER_GATEWAY_LABEL_KEY, name),
        ],
    )
}

fn provisioner_labels(provider: &KafkaProvider) -> BTreeMap<String, String> {
    let name = name_of(provider);
    child_labels(
        provider,
        &[
            (KAFKA_PROVIDER_LABEL_KEY, name),
            (KAFKA_PROVIDER_PROVISIONER_LABEL_KEY, name),
            (PROVISIONER_LABEL_KEY, "kafka"),
        ],
    )
}

fn single_container_deployment(
    generate_name: String,
    labels: BTreeMap<String, String>,
    match_labels: BTreeMap<String, String>,
    container: Container,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            generate_name: Some(generate_name),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(match_labels),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Liiklus gateway backed by the provider's Kafka brokers
pub fn desired_gateway_deployment(provider: &KafkaProvider, image: &str) -> Deployment {
    let name = name_of(provider);
    single_container_deployment(
        format!("{name}-kafka-gateway-"),
        gateway_labels(provider),
        selector(KAFKA_PROVIDER_GATEWAY_LABEL_KEY, name),
        Container {
            name: "gateway".to_owned(),
            image: Some(image.to_owned()),
            image_pull_policy: Some("Always".to_owned()),
            env: Some(vec![
                env("kafka_bootstrapServers", &provider.spec.bootstrap_servers),
                env("storage_positions_type", "MEMORY"),
                env("storage_records_type", "KAFKA"),
            ]),
            ..Container::default()
        },
    )
}

pub fn desired_gateway_service(provider: &KafkaProvider) -> Service {
    let name = name_of(provider);
    Service {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-kafka-gateway-")),
            labels: Some(gateway_labels(provider)),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("gateway".to_owned()),
                port: GATEWAY_PORT,
                ..ServicePort::default()
            }]),
            selector: Some(selector(KAFKA_PROVIDER_GATEWAY_LABEL_KEY, name)),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Provisions topics on behalf of streams; `gateway_address` is
/// `<gateway service>.<namespace>:6565`
pub fn desired_provisioner_deployment(provider: &KafkaProvider, image: &str, gateway_address: &str) -> Deployment {
    let name = name_of(provider);
    single_container_deployment(
        format!("{name}-kafka-provisioner-"),
        provisioner_labels(provider),
        selector(KAFKA_PROVIDER_PROVISIONER_LABEL_KEY, name),
        Container {
            name: "main".to_owned(),
            image: Some(image.to_owned()),
            image_pull_policy: Some("Always".to_owned()),
            env: Some(vec![
                env("GATEWAY", gateway_address),
                env("BROKER", &provider.spec.bootstrap_servers),
            ]),
            ..Container::default()
        },
    )
}

pub fn desired_provisioner_service(provider: &KafkaProvider) -> Service {
    let name = name_of(provider);
    Service {
        metadata: ObjectMeta {
            name: Some(format!("{name}-kafka-provisioner")),
            labels: Some(provisioner_labels(provider)),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_owned()),
                port: 80,
                target_port: Some(IntOrString::Int(8080)),
                ..ServicePort::default()
            }]),
            selector: Some(selector(KAFKA_PROVIDER_PROVISIONER_LABEL_KEY, name)),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::KafkaProviderSpec;

    fn provider() -> KafkaProvider {
        let mut provider = KafkaProvider::new(
            "franz",
            KafkaProviderSpec {
                bootstrap_servers: "kafka:9092".to_owned(),
            },
        );
        provider.metadata.namespace = Some("default".to_owned());
        provider.metadata.labels = Some(selector("team", "streams"));
        provider
    }

    #[test]
    fn test_gateway_deployment_shape() {
        let deployment = desired_gateway_deployment(&provider(), "gateway:1");
        assert_eq!(deployment.metadata.generate_name.as_deref(), Some("franz-kafka-gateway-"));
        let labels = deployment.metadata.labels.clone().unwrap();
        assert_eq!(labels["team"], "streams");
        assert_eq!(labels[KAFKA_PROVIDER_LABEL_KEY], "franz");
        assert_eq!(labels[KAFKA_PROVIDER_GATEWAY_LABEL_KEY], "franz");

        let spec = deployment.spec.unwrap();
        assert_eq!(
            spec.selector.match_labels.unwrap(),
            selector(KAFKA_PROVIDER_GATEWAY_LABEL_KEY, "franz")
        );
        let container = &spec.template.spec.unwrap().containers[0];
        assert_eq!(container.name, "gateway");
        assert_eq!(container.image.as_deref(), Some("gateway:1"));
        let env = container.env.clone().unwrap();
        assert_eq!(env[0].name, "kafka_bootstrapServers");
        assert_eq!(env[0].value.as_deref(), Some("kafka:9092"));
    }

    #[test]
    fn test_provisioner_children_shape() {
        let deployment = desired_provisioner_deployment(&provider(), "provisioner:1", "franz-kafka-gateway-x.default:6565");
        let labels = deployment.metadata.labels.clone().unwrap();
        assert_eq!(labels[PROVISIONER_LABEL_KEY], "kafka");
        let env = deployment.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        assert_eq!(env[0].value.as_deref(), Some("franz-kafka-gateway-x.default:6565"));
        assert_eq!(env[1].name, "BROKER");

        let service = desired_provisioner_service(&provider());
        assert_eq!(service.metadata.name.as_deref(), Some("franz-kafka-provisioner"));
        let port = &service.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
    }

    #[test]
    fn test_missing_image_is_configuration_error() {
        let images = ConfigMap {
            data: Some(selector(GATEWAY_IMAGE_KEY, "")),
            ..ConfigMap::default()
        };
        let err = image(&images, GATEWAY_IMAGE_KEY, "gateway image configuration").unwrap_err();
        assert_eq!(err.to_string(), "missing gateway image configuration");
    }
}
