//! # Field Indexes
//!
//! Derived indexes registered per kind so `list` can answer "children of
//! parent X" without scanning the whole namespace.

use super::{gvk_of_type_meta, StoreError};
use kube::core::{DynamicObject, GroupVersionKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Extracts the index values of an object
pub type IndexFn = Arc<dyn Fn(&DynamicObject) -> Vec<String> + Send + Sync>;

/// Registry of (kind, field) -> index function
#[derive(Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<(GroupVersionKind, String), IndexFn>>,
}

impl fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = indexes
            .keys()
            .map(|(gvk, field)| format!("{}:{}", gvk.kind, field))
            .collect();
        keys.sort();
        f.debug_struct("IndexRegistry").field("indexes", &keys).finish()
    }
}

impl IndexRegistry {
    pub fn register(&self, gvk: &GroupVersionKind, field: impl Into<String>, index: IndexFn) {
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((gvk.clone(), field.into()), index);
    }

    /// Index `child` objects by the name of their controlling owner of kind `owner`
    pub fn register_controller_owner(
        &self,
        child: &GroupVersionKind,
        field: impl Into<String>,
        owner: &GroupVersionKind,
    ) {
        let owner = owner.clone();
        self.register(
            child,
            field,
            Arc::new(move |obj: &DynamicObject| controller_owner_name(obj, &owner).into_iter().collect()),
        );
    }

    pub fn is_registered(&self, gvk: &GroupVersionKind, field: &str) -> bool {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(gvk.clone(), field.to_owned()))
    }

    pub fn lookup(&self, gvk: &GroupVersionKind, field: &str) -> Result<IndexFn, StoreError> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(gvk.clone(), field.to_owned()))
            .cloned()
            .ok_or_else(|| StoreError::IndexNotRegistered {
                kind: gvk.kind.clone(),
                field: field.to_owned(),
            })
    }
}

/// Name of the controlling owner reference of the given kind, if any
pub fn controller_owner_name(obj: &DynamicObject, owner: &GroupVersionKind) -> Option<String> {
    obj.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| {
            r.controller == Some(true) && {
                let types = kube::core::TypeMeta {
                    api_version: r.api_version.clone(),
                    kind: r.kind.clone(),
                };
                gvk_of_type_meta(&types) == *owner
            }
        })
        .map(|r| r.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::core::ApiResource;

    fn provider_gvk() -> GroupVersionKind {
        GroupVersionKind::gvk("streaming.projectriff.io", "v1alpha1", "KafkaProvider")
    }

    fn deployment_owned_by(owner: &str, controller: bool) -> DynamicObject {
        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        let mut obj = DynamicObject::new("child", &ApiResource::from_gvk(&gvk)).within("default");
        obj.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "streaming.projectriff.io/v1alpha1".to_owned(),
            kind: "KafkaProvider".to_owned(),
            name: owner.to_owned(),
            uid: "uid-1".to_owned(),
            controller: Some(controller),
            block_owner_deletion: Some(true),
        }]);
        obj
    }

    #[test]
    fn test_controller_owner_index() {
        let registry = IndexRegistry::default();
        let deployments = GroupVersionKind::gvk("apps", "v1", "Deployment");
        registry.register_controller_owner(&deployments, ".metadata.controller", &provider_gvk());

        let index = registry.lookup(&deployments, ".metadata.controller").unwrap();
        assert_eq!(index(&deployment_owned_by("kafka", true)), vec!["kafka".to_owned()]);
        assert!(index(&deployment_owned_by("kafka", false)).is_empty());
    }

    #[test]
    fn test_unregistered_index() {
        let registry = IndexRegistry::default();
        let err = registry
            .lookup(&GroupVersionKind::gvk("", "v1", "Service"), ".metadata.controller")
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::IndexNotRegistered { .. }));
    }
}
