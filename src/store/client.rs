//! # Typed Client
//!
//! Typed convenience layer over an [`ObjectStore`]. Objects are converted
//! through JSON to and from `DynamicObject`, with `apiVersion`/`kind` always
//! filled in from the Rust type.

use super::{gvk_of, type_meta_of, IndexRegistry, ListSelector, ObjectStore, ResourceKey, StoreError};
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

/// Any statically typed Kubernetes object the reconcilers read or write
pub trait Object:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Object for T where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

pub fn to_dynamic<K: Object>(obj: &K) -> Result<DynamicObject, StoreError> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    dynamic.types = Some(type_meta_of(&gvk_of::<K>()));
    Ok(dynamic)
}

pub fn from_dynamic<K: Object>(mut obj: DynamicObject) -> Result<K, StoreError> {
    obj.types = Some(type_meta_of(&gvk_of::<K>()));
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

#[derive(Clone)]
pub struct TypedClient {
    store: Arc<dyn ObjectStore>,
}

impl Debug for TypedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedClient").finish_non_exhaustive()
    }
}

impl TypedClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn indexes(&self) -> &IndexRegistry {
        self.store.indexes()
    }

    pub async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let obj = self.store.get(&ResourceKey::of::<K>(namespace, name)).await?;
        from_dynamic(obj)
    }

    pub async fn list<K: Object>(
        &self,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<K>, StoreError> {
        self.store
            .list(&gvk_of::<K>(), namespace, selector)
            .await?
            .into_iter()
            .map(from_dynamic)
            .collect()
    }

    pub async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let created = self.store.create(&to_dynamic(obj)?).await?;
        from_dynamic(created)
    }

    pub async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let updated = self.store.update(&to_dynamic(obj)?).await?;
        from_dynamic(updated)
    }

    pub async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let updated = self.store.update_status(&to_dynamic(obj)?).await?;
        from_dynamic(updated)
    }

    pub async fn delete<K: Object>(&self, obj: &K) -> Result<(), StoreError> {
        let key = ResourceKey::for_object(obj)
            .ok_or_else(|| StoreError::Invalid(format!("{} without a name", K::kind(&()))))?;
        self.store.delete(&key).await
    }

    /// Read an object whose kind is only known at runtime
    pub async fn get_dynamic(&self, key: &ResourceKey) -> Result<DynamicObject, StoreError> {
        self.store.get(key).await
    }

    pub async fn update_dynamic(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        self.store.update(obj).await
    }
}
