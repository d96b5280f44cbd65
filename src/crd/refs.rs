//! # Object References
//!
//! Status cross-references to owned children, for display.

use kube::Resource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to an object in the same namespace as the parent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalObjectReference {
    /// API group of the referenced kind; omitted for the core group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    pub kind: String,
    pub name: String,
}

impl TypedLocalObjectReference {
    pub fn for_object<K>(obj: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let group = K::group(&());
        Some(Self {
            api_group: (!group.is_empty()).then(|| group.into_owned()),
            kind: K::kind(&()).into_owned(),
            name: obj.meta().name.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    #[test]
    fn test_reference_groups() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("gw-abc12".to_owned()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        };
        let reference = TypedLocalObjectReference::for_object(&deployment).unwrap();
        assert_eq!(reference.api_group.as_deref(), Some("apps"));
        assert_eq!(reference.kind, "Deployment");

        let service = Service {
            metadata: ObjectMeta {
                name: Some("gw".to_owned()),
                ..ObjectMeta::default()
            },
            ..Service::default()
        };
        assert_eq!(TypedLocalObjectReference::for_object(&service).unwrap().api_group, None);
        assert!(TypedLocalObjectReference::for_object(&Service::default()).is_none());
    }
}
