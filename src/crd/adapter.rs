//! # Adapter
//!
//! An Adapter copies the latest image produced by a build resource into an
//! existing Knative Service or Configuration it does not own.

use super::external::{BuildKind, TargetKind};
use super::{conditioned_status, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const ADAPTER_CONDITION_READY: &str = "Ready";
pub const ADAPTER_CONDITION_BUILD_READY: &str = "BuildReady";
pub const ADAPTER_CONDITION_TARGET_FOUND: &str = "TargetFound";

/// Adapter Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: knative.projectriff.io/v1alpha1
/// kind: Adapter
/// metadata:
///   name: my-adapter
/// spec:
///   build:
///     functionRef: my-function
///   target:
///     serviceRef: my-service
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Adapter",
    group = "knative.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "AdapterStatus",
    category = "riff",
    printcolumn = r#"{"name":"Latest Image", "type":"string", "jsonPath":".status.latestImage"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSpec {
    /// Build resource producing the image; exactly one reference is set
    pub build: Build,
    /// Knative resource the image is written into; exactly one reference is set
    pub target: AdapterTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_ref: Option<String>,
}

impl Build {
    /// The single build reference, or `None` unless exactly one is set
    pub fn reference(&self) -> Option<(BuildKind, &str)> {
        let refs: Vec<(BuildKind, &str)> = [
            (BuildKind::Application, self.application_ref.as_deref()),
            (BuildKind::Function, self.function_ref.as_deref()),
            (BuildKind::Container, self.container_ref.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, name)| name.filter(|n| !n.is_empty()).map(|n| (kind, n)))
        .collect();
        match refs.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdapterTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_ref: Option<String>,
}

impl AdapterTarget {
    /// The single target reference, or `None` unless exactly one is set
    pub fn reference(&self) -> Option<(TargetKind, &str)> {
        match (
            self.service_ref.as_deref().filter(|n| !n.is_empty()),
            self.configuration_ref.as_deref().filter(|n| !n.is_empty()),
        ) {
            (Some(name), None) => Some((TargetKind::Service, name)),
            (None, Some(name)) => Some((TargetKind::Configuration, name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Image most recently resolved from the build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
}

conditioned_status!(AdapterStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_reference_requires_exactly_one() {
        let build = Build {
            function_ref: Some("square".to_owned()),
            ..Build::default()
        };
        assert_eq!(build.reference(), Some((BuildKind::Function, "square")));

        let ambiguous = Build {
            application_ref: Some("app".to_owned()),
            container_ref: Some("img".to_owned()),
            ..Build::default()
        };
        assert_eq!(ambiguous.reference(), None);
        assert_eq!(Build::default().reference(), None);
    }

    #[test]
    fn test_target_reference() {
        let target = AdapterTarget {
            configuration_ref: Some("my-configuration".to_owned()),
            ..AdapterTarget::default()
        };
        assert_eq!(
            target.reference(),
            Some((TargetKind::Configuration, "my-configuration"))
        );
        assert_eq!(AdapterTarget::default().reference(), None);
    }
}
