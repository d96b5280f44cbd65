//! # Kubernetes Store
//!
//! `ObjectStore` backed by the Kubernetes API server. Label selectors are
//! evaluated server-side, field indexes client-side on the listed page.

use super::{filter_by_index, IndexRegistry, ListSelector, ObjectStore, ResourceKey, StoreError};
use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use std::fmt;
use tracing::debug;

pub struct KubeStore {
    client: Client,
    indexes: IndexRegistry,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("indexes", &self.indexes)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indexes: IndexRegistry::default(),
        }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(CONTROLLER_NAME.to_owned()),
        }
    }
}

fn key_of(obj: &DynamicObject) -> Result<ResourceKey, StoreError> {
    ResourceKey::for_dynamic(obj)
        .ok_or_else(|| StoreError::Invalid("object without type information or name".to_owned()))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject, StoreError> {
        self.api(&key.gvk(), &key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, key))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        // fail before the round trip when the index is unknown
        if let Some(index) = &selector.index {
            self.indexes.lookup(gvk, &index.field)?;
        }
        let mut params = ListParams::default();
        if let Some(labels) = selector.label_selector() {
            params = params.labels(&labels);
        }
        let list = self
            .api(gvk, namespace)
            .list(&params)
            .await
            .map_err(StoreError::Kube)?;
        debug!(
            kind = %gvk.kind,
            namespace = namespace,
            count = list.items.len(),
            "Listed objects"
        );
        filter_by_index(&self.indexes, gvk, selector, list.items)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| StoreError::Invalid("object without type information".to_owned()))?;
        let gvk = super::gvk_of_type_meta(types);
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let key = ResourceKey::new(
            &gvk,
            namespace.clone(),
            object
                .metadata
                .name
                .clone()
                .or_else(|| object.metadata.generate_name.clone())
                .unwrap_or_default(),
        );
        self.api(&gvk, &namespace)
            .create(&Self::post_params(), object)
            .await
            .map_err(|e| StoreError::from_kube(e, &key))
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(object)?;
        self.api(&key.gvk(), &key.namespace)
            .replace(&key.name, &Self::post_params(), object)
            .await
            .map_err(|e| StoreError::from_kube(e, &key))
    }

    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(object)?;
        // resourceVersion in the patch keeps the write optimistic
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.metadata.resource_version },
            "status": object.data.get("status"),
        });
        self.api(&key.gvk(), &key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(e, &key))
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        self.api(&key.gvk(), &key.namespace)
            .delete(&key.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(e, key))
    }

    fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }
}
