//! # External Kinds
//!
//! Kinds owned by other systems that the reconcilers only read (and, for
//! Adapter targets, patch in place). They are handled as `DynamicObject`s so
//! fields this controller does not know about survive a read-modify-write.

use super::Condition;
use kube::core::{DynamicObject, GroupVersionKind};

pub const BUILD_GROUP: &str = "build.projectriff.io";
pub const BUILD_VERSION: &str = "v1alpha1";
pub const KNATIVE_SERVING_GROUP: &str = "serving.knative.dev";
pub const KNATIVE_SERVING_VERSION: &str = "v1";
pub const STREAMING_GROUP: &str = "streaming.projectriff.io";
pub const STREAMING_VERSION: &str = "v1alpha1";

const FIRST_CONTAINER_IMAGE: &str = "/spec/template/spec/containers/0/image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    Application,
    Function,
    Container,
}

impl BuildKind {
    pub fn gvk(self) -> GroupVersionKind {
        GroupVersionKind::gvk(BUILD_GROUP, BUILD_VERSION, self.kind())
    }

    pub fn kind(self) -> &'static str {
        match self {
            Self::Application => "Application",
            Self::Function => "Function",
            Self::Container => "Container",
        }
    }

    /// Lower-case noun used in condition messages
    pub fn noun(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Function => "function",
            Self::Container => "container",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Service,
    Configuration,
}

impl TargetKind {
    pub fn gvk(self) -> GroupVersionKind {
        GroupVersionKind::gvk(KNATIVE_SERVING_GROUP, KNATIVE_SERVING_VERSION, self.kind())
    }

    pub fn kind(self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Configuration => "Configuration",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Configuration => "configuration",
        }
    }
}

pub fn stream_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(STREAMING_GROUP, STREAMING_VERSION, "Stream")
}

/// Condition of the given type from `status.conditions`
pub fn status_condition(obj: &DynamicObject, r#type: &str) -> Option<Condition> {
    obj.data
        .pointer("/status/conditions")?
        .as_array()?
        .iter()
        .filter_map(|c| serde_json::from_value::<Condition>(c.clone()).ok())
        .find(|c| c.r#type == r#type)
}

/// `status.latestImage`, ignoring empty strings
pub fn latest_image(obj: &DynamicObject) -> Option<String> {
    non_empty_str(obj, "/status/latestImage")
}

/// `status.address.gateway` of a Stream
pub fn stream_gateway_address(obj: &DynamicObject) -> Option<String> {
    non_empty_str(obj, "/status/address/gateway")
}

/// Image of the first container in `spec.template.spec.containers`
pub fn first_container_image(obj: &DynamicObject) -> Option<String> {
    non_empty_str(obj, FIRST_CONTAINER_IMAGE)
}

/// Set the first container image, leaving every other field untouched.
/// Returns false when the object has no first container.
pub fn set_first_container_image(obj: &mut DynamicObject, image: &str) -> bool {
    match obj.data.pointer_mut(FIRST_CONTAINER_IMAGE) {
        Some(value) => {
            *value = serde_json::Value::String(image.to_owned());
            true
        }
        None => match obj.data.pointer_mut("/spec/template/spec/containers/0") {
            Some(serde_json::Value::Object(container)) => {
                container.insert(
                    "image".to_owned(),
                    serde_json::Value::String(image.to_owned()),
                );
                true
            }
            _ => false,
        },
    }
}

fn non_empty_str(obj: &DynamicObject, pointer: &str) -> Option<String> {
    obj.data
        .pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
