//! # Processor Reconciler
//!
//! A Processor needs three things before it can run: a Function with a built
//! image, gateway addresses for every input and output Stream, and the
//! sidecar image from the processor images ConfigMap. All of them are read,
//! not owned, so each is tracked. The one owned child is the Deployment
//! running the function next to the processor sidecar. Its replica count
//! belongs to the autoscaler.

use super::children::{propagate_deployment_available, ChildReconciler};
use super::conditions::ConditionSet;
use super::context::Context;
use super::engine::{Outcome, Parent, ParentReconciler};
use super::error::ReconcilerError;
use super::labels::{child_labels, controller_index_field};
use crate::crd::external::{latest_image, status_condition, stream_gateway_address, stream_gvk, BuildKind};
use crate::crd::{
    Processor, ProcessorStatus, TypedLocalObjectReference, PROCESSOR_CONDITION_DEPLOYMENT_READY,
    PROCESSOR_CONDITION_FUNCTION_READY, PROCESSOR_CONDITION_READY, PROCESSOR_CONDITION_STREAMS_READY,
    PROCESSOR_LABEL_KEY,
};
use crate::store::{gvk_of, IndexRegistry, ResourceKey, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use tracing::{debug, error};

pub const PROCESSOR_IMAGE_KEY: &str = "processorImage";
/// Where the sidecar reaches the function container inside the pod
pub const FUNCTION_ADDRESS: &str = "localhost:8081";

impl Parent for Processor {
    type Status = ProcessorStatus;

    const CONDITIONS: ConditionSet = ConditionSet::new(
        PROCESSOR_CONDITION_READY,
        &[
            PROCESSOR_CONDITION_FUNCTION_READY,
            PROCESSOR_CONDITION_STREAMS_READY,
            PROCESSOR_CONDITION_DEPLOYMENT_READY,
        ],
    );

    fn status(&self) -> Option<&ProcessorStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut ProcessorStatus {
        self.status.get_or_insert_with(ProcessorStatus::default)
    }
}

/// Why the streams of a Processor are not usable yet
enum StreamProblem {
    NotFound(String),
    NotReady(String),
}

#[derive(Debug)]
pub struct ProcessorReconciler {
    deployment_index: String,
}

impl ProcessorReconciler {
    pub fn new() -> Self {
        Self {
            deployment_index: controller_index_field("Processor", "Deployment"),
        }
    }

    /// Gateway addresses of `names`, in order. Every stream is tracked even
    /// after a problem is found, so any of them appearing re-triggers.
    async fn resolve_streams(
        ctx: &Context,
        dependent: &ResourceKey,
        namespace: &str,
        names: &[String],
        problem: &mut Option<StreamProblem>,
    ) -> Result<Vec<String>, ReconcilerError> {
        let mut addresses = Vec::with_capacity(names.len());
        for name in names {
            let key = ResourceKey::new(&stream_gvk(), namespace, name.as_str());
            match ctx.track_and_get_dynamic(dependent, &key).await {
                Ok(stream) => match stream_gateway_address(&stream) {
                    Some(address) => addresses.push(address),
                    None => {
                        problem.get_or_insert_with(|| StreamProblem::NotReady(name.clone()));
                    }
                },
                Err(StoreError::NotFound { .. }) => {
                    problem.get_or_insert_with(|| StreamProblem::NotFound(name.clone()));
                }
                Err(e) => {
                    error!(stream = %key, error = %e, "Unable to read stream");
                    return Err(e.into());
                }
            }
        }
        Ok(addresses)
    }
}

impl Default for ProcessorReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParentReconciler for ProcessorReconciler {
    type Resource = Processor;

    fn register_indexes(&self, indexes: &IndexRegistry) {
        indexes.register_controller_owner(
            &gvk_of::<Deployment>(),
            self.deployment_index.as_str(),
            &gvk_of::<Processor>(),
        );
    }

    async fn reconcile(&self, ctx: &Context, processor: &mut Processor) -> Result<Outcome, ReconcilerError> {
        let dependent = processor.key()?;
        let namespace = processor.require_namespace()?.to_owned();

        let function_key = ResourceKey::new(
            &BuildKind::Function.gvk(),
            namespace.as_str(),
            processor.spec.function_ref.as_str(),
        );
        let function = match ctx.track_and_get_dynamic(&dependent, &function_key).await {
            Ok(function) => function,
            Err(StoreError::NotFound { .. }) => {
                debug!(function = %function_key, "Function not found");
                processor.conditions().mark_false(
                    PROCESSOR_CONDITION_FUNCTION_READY,
                    "NotFound",
                    format!("The function {:?} was not found.", function_key.name),
                );
                return Ok(Outcome::Done);
            }
            Err(e) => {
                error!(function = %function_key, error = %e, "Unable to read function");
                return Err(e.into());
            }
        };
        match status_condition(&function, "Ready") {
            Some(ready) => processor
                .conditions()
                .propagate(PROCESSOR_CONDITION_FUNCTION_READY, &ready),
            None => processor.conditions().mark_unknown(
                PROCESSOR_CONDITION_FUNCTION_READY,
                "FunctionNotReady",
                format!("The function {:?} has not reported readiness.", function_key.name),
            ),
        }
        let Some(image) = latest_image(&function) else {
            debug!(function = %function_key, "Function has no latest image yet");
            return Ok(Outcome::Done);
        };
        processor.status_mut().latest_image = Some(image.clone());

        let mut problem = None;
        let inputs = Self::resolve_streams(ctx, &dependent, &namespace, &processor.spec.inputs, &mut problem).await?;
        let outputs = Self::resolve_streams(ctx, &dependent, &namespace, &processor.spec.outputs, &mut problem).await?;
        match problem {
            Some(StreamProblem::NotFound(name)) => {
                processor.conditions().mark_false(
                    PROCESSOR_CONDITION_STREAMS_READY,
                    "NotFound",
                    format!("The stream {name:?} was not found."),
                );
                return Ok(Outcome::Done);
            }
            Some(StreamProblem::NotReady(name)) => {
                processor.conditions().mark_unknown(
                    PROCESSOR_CONDITION_STREAMS_READY,
                    "StreamNotReady",
                    format!("The stream {name:?} is not ready."),
                );
                return Ok(Outcome::Done);
            }
            None => {}
        }
        let status = processor.status_mut();
        status.input_addresses = inputs;
        status.output_addresses = outputs;
        processor.conditions().mark_true(PROCESSOR_CONDITION_STREAMS_READY);

        let images_namespace = ctx.config.system_namespace.as_str();
        let images_name = ctx.config.processor_images_config_map.as_str();
        let images = match ctx
            .track_and_get::<ConfigMap>(&dependent, images_namespace, images_name)
            .await
        {
            Ok(images) => images,
            Err(StoreError::NotFound { .. }) => {
                error!(config_map = images_name, "Images ConfigMap not found");
                return Err(ReconcilerError::missing_configuration(format!(
                    "ConfigMap {images_namespace}/{images_name} with processor images"
                )));
            }
            Err(e) => {
                error!(error = %e, "Unable to look up images ConfigMap");
                return Err(e.into());
            }
        };
        let sidecar_image = images
            .data
            .as_ref()
            .and_then(|data| data.get(PROCESSOR_IMAGE_KEY))
            .filter(|image| !image.is_empty())
            .cloned()
            .ok_or_else(|| ReconcilerError::missing_configuration("processor image configuration"))?;

        let deployment = {
            let parent = &*processor;
            ChildReconciler::<Processor, Deployment>::new(
                ctx,
                parent,
                "processor",
                PROCESSOR_LABEL_KEY,
                &self.deployment_index,
            )?
            .reconcile(|| Ok(Some(desired_deployment(parent, &image, &sidecar_image))))
            .await?
        };
        if let Some(deployment) = &deployment {
            processor.status_mut().deployment_ref = TypedLocalObjectReference::for_object(deployment);
            propagate_deployment_available(
                &mut processor.conditions(),
                PROCESSOR_CONDITION_DEPLOYMENT_READY,
                deployment,
            );
        }

        Ok(Outcome::Done)
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        value_from: None,
    }
}

/// Function container plus processor sidecar. Reads the stream addresses
/// from `processor`'s status, so they must be resolved first.
pub fn desired_deployment(processor: &Processor, function_image: &str, sidecar_image: &str) -> Deployment {
    let name = processor.metadata.name.as_deref().unwrap_or_default();
    let labels = child_labels(processor, &[(PROCESSOR_LABEL_KEY, name)]);
    let (inputs, outputs) = processor
        .status
        .as_ref()
        .map(|s| (s.input_addresses.join(","), s.output_addresses.join(",")))
        .unwrap_or_default();

    Deployment {
        metadata: ObjectMeta {
            name: Some(format!("{name}-processor")),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(PROCESSOR_LABEL_KEY.to_owned(), name.to_owned())])),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![
                        Container {
                            name: "function".to_owned(),
                            image: Some(function_image.to_owned()),
                            ..Container::default()
                        },
                        Container {
                            name: "processor".to_owned(),
                            image: Some(sidecar_image.to_owned()),
                            image_pull_policy: Some("Always".to_owned()),
                            env: Some(vec![
                                env("INPUTS", &inputs),
                                env("OUTPUTS", &outputs),
                                env("FUNCTION", FUNCTION_ADDRESS),
                                env("GROUP", name),
                            ]),
                            ..Container::default()
                        },
                    ],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ProcessorSpec;

    #[test]
    fn test_desired_deployment_wires_streams() {
        let mut processor = Processor::new(
            "square",
            ProcessorSpec {
                function_ref: "square".to_owned(),
                inputs: vec!["numbers".to_owned()],
                outputs: vec!["squares".to_owned(), "audit".to_owned()],
            },
        );
        processor.status = Some(ProcessorStatus {
            input_addresses: vec!["gw:6565/numbers".to_owned()],
            output_addresses: vec!["gw:6565/squares".to_owned(), "gw:6565/audit".to_owned()],
            ..ProcessorStatus::default()
        });

        let deployment = desired_deployment(&processor, "fn:1", "sidecar:1");
        assert_eq!(deployment.metadata.name.as_deref(), Some("square-processor"));
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, None);
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers[0].image.as_deref(), Some("fn:1"));
        let env: BTreeMap<String, String> = containers[1]
            .env
            .clone()
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.value.unwrap_or_default()))
            .collect();
        assert_eq!(env["INPUTS"], "gw:6565/numbers");
        assert_eq!(env["OUTPUTS"], "gw:6565/squares,gw:6565/audit");
        assert_eq!(env["FUNCTION"], "localhost:8081");
        assert_eq!(env["GROUP"], "square");
    }
}
