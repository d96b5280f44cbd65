//! # Object Store
//!
//! The boundary between the reconcilers and the system of record.
//!
//! Reconcilers never talk to the Kubernetes API directly. They go through an
//! [`ObjectStore`], which speaks `DynamicObject` keyed by [`ResourceKey`], and
//! the [`TypedClient`] wrapper that converts to and from concrete types.
//!
//! ## Implementations
//!
//! - [`KubeStore`] - backed by a `kube::Client`
//! - [`MemoryStore`] - in-memory store with action logs and failure injection

mod client;
mod error;
mod index;
mod key;
mod kubernetes;
mod memory;

pub use client::{from_dynamic, to_dynamic, Object, TypedClient};
pub use error::StoreError;
pub use index::{controller_owner_name, IndexFn, IndexRegistry};
pub use key::{gvk_of, gvk_of_type_meta, type_meta_of, ResourceKey};
pub use kubernetes::KubeStore;
pub use memory::{ActionLog, MemoryStore, Verb};

use kube::core::{DynamicObject, GroupVersionKind};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Storage operations the reconcilers depend on
///
/// Status is a separate sub-resource: `update` never changes status and
/// `update_status` never changes anything but status.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject, StoreError>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError>;

    fn indexes(&self) -> &IndexRegistry;
}

/// Equality label selector plus an optional field index match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSelector {
    pub labels: BTreeMap<String, String>,
    pub index: Option<IndexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelector {
    pub field: String,
    pub value: String,
}

impl ListSelector {
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn index(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.index = Some(IndexSelector {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Label selector in `k=v,k2=v2` form
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    pub fn matches_labels(&self, obj: &DynamicObject) -> bool {
        let labels = obj.metadata.labels.as_ref();
        self.labels
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }
}

/// Apply the index part of a selector. Fails when the index was never registered.
pub(crate) fn filter_by_index(
    indexes: &IndexRegistry,
    gvk: &GroupVersionKind,
    selector: &ListSelector,
    objects: Vec<DynamicObject>,
) -> Result<Vec<DynamicObject>, StoreError> {
    let Some(index) = &selector.index else {
        return Ok(objects);
    };
    let extract = indexes.lookup(gvk, &index.field)?;
    Ok(objects
        .into_iter()
        .filter(|obj| extract(obj).iter().any(|v| *v == index.value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector_string_is_sorted() {
        let selector = ListSelector::default()
            .label("b", "2")
            .label("a", "1")
            .index(".metadata.controller", "x");
        assert_eq!(selector.label_selector().as_deref(), Some("a=1,b=2"));
        assert_eq!(ListSelector::default().label_selector(), None);
    }
}
