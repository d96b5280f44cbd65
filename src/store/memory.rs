//! # In-Memory Store
//!
//! `ObjectStore` kept entirely in process. Used by tests and by anything that
//! needs to run the reconcilers without an API server.
//!
//! Behaves like the API server where the reconcilers can observe it:
//!
//! - `generateName` is expanded with a deterministic suffix
//! - `uid`, `resourceVersion` and `generation` are assigned
//! - `update` and `update_status` reject stale resource versions
//! - `update` keeps the stored status; `update_status` only changes status
//!
//! Every mutating call is appended to an [`ActionLog`] before it is applied,
//! so failed attempts are visible too. Failures are injected per verb and kind
//! with [`MemoryStore::fail_on`].

use super::{
    filter_by_index, gvk_of_type_meta, IndexRegistry, ListSelector, ObjectStore, ResourceKey,
    StoreError,
};
use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

/// Ordered record of the mutating calls made against the store
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    /// Objects as submitted to `create`
    pub creates: Vec<DynamicObject>,
    /// Objects as submitted to `update`
    pub updates: Vec<DynamicObject>,
    /// Objects as submitted to `update_status`
    pub status_updates: Vec<DynamicObject>,
    pub deletes: Vec<ResourceKey>,
}

impl ActionLog {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.status_updates.is_empty()
            && self.deletes.is_empty()
    }
}

#[derive(Debug)]
struct Reactor {
    verb: Verb,
    kind: String,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKey, DynamicObject>,
    actions: ActionLog,
    reactors: Vec<Reactor>,
    counter: u64,
}

impl State {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn check(&self, verb: Verb, kind: &str) -> Result<(), StoreError> {
        match self
            .reactors
            .iter()
            .find(|r| r.verb == verb && (r.kind == kind || r.kind == "*"))
        {
            Some(reactor) => Err(StoreError::Unavailable(reactor.message.clone())),
            None => Ok(()),
        }
    }

    fn assign_identity(&mut self, obj: &mut DynamicObject) {
        let n = self.next();
        if obj.metadata.uid.is_none() {
            obj.metadata.uid = Some(format!("uid-{n:05}"));
        }
        obj.metadata.resource_version = Some(n.to_string());
        if obj.metadata.generation.is_none() {
            obj.metadata.generation = Some(1);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    indexes: IndexRegistry,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without recording an action. Identity fields are
    /// assigned when missing; an existing object with the same key is replaced.
    pub fn insert(&self, mut obj: DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(&obj)?;
        let mut state = self.state();
        state.assign_identity(&mut obj);
        state.objects.insert(key, obj.clone());
        Ok(obj)
    }

    /// Make every call of `verb` on objects of `kind` fail. `"*"` matches any kind.
    pub fn fail_on(&self, verb: Verb, kind: impl Into<String>, message: impl Into<String>) {
        self.state().reactors.push(Reactor {
            verb,
            kind: kind.into(),
            message: message.into(),
        });
    }

    pub fn clear_failures(&self) {
        self.state().reactors.clear();
    }

    pub fn actions(&self) -> ActionLog {
        self.state().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.state().actions = ActionLog::default();
    }

    pub fn object(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn objects_of(&self, gvk: &GroupVersionKind) -> Vec<DynamicObject> {
        self.state()
            .objects
            .iter()
            .filter(|(key, _)| key.is_kind(gvk))
            .map(|(_, obj)| obj.clone())
            .collect()
    }
}

fn key_of(obj: &DynamicObject) -> Result<ResourceKey, StoreError> {
    ResourceKey::for_dynamic(obj)
        .ok_or_else(|| StoreError::Invalid("object without type information or name".to_owned()))
}

fn spec_of(obj: &DynamicObject) -> serde_json::Value {
    let mut data = obj.data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

fn check_resource_version(
    key: &ResourceKey,
    submitted: &DynamicObject,
    stored: &DynamicObject,
) -> Result<(), StoreError> {
    match &submitted.metadata.resource_version {
        Some(rv) if Some(rv) != stored.metadata.resource_version.as_ref() => {
            Err(StoreError::Conflict {
                key: key.clone(),
                message: format!(
                    "the object has been modified; resourceVersion {} is stale",
                    rv
                ),
            })
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<DynamicObject, StoreError> {
        let state = self.state();
        state.check(Verb::Get, &key.kind)?;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let matching = {
            let state = self.state();
            state.check(Verb::List, &gvk.kind)?;
            state
                .objects
                .iter()
                .filter(|(key, _)| key.is_kind(gvk))
                .filter(|(key, _)| namespace.is_empty() || key.namespace == namespace)
                .filter(|(_, obj)| selector.matches_labels(obj))
                .map(|(_, obj)| obj.clone())
                .collect::<Vec<_>>()
        };
        filter_by_index(&self.indexes, gvk, selector, matching)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let types = object
            .types
            .clone()
            .ok_or_else(|| StoreError::Invalid("object without type information".to_owned()))?;
        let gvk = gvk_of_type_meta(&types);
        let mut state = self.state();
        state.actions.creates.push(object.clone());
        state.check(Verb::Create, &gvk.kind)?;

        let mut created = object.clone();
        if created.metadata.name.is_none() {
            let prefix = created.metadata.generate_name.clone().ok_or_else(|| {
                StoreError::Invalid("object without name or generateName".to_owned())
            })?;
            let suffix = state.next();
            created.metadata.name = Some(format!("{prefix}{suffix:05x}"));
        }
        let key = key_of(&created)?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { key });
        }
        created.metadata.uid = None;
        created.metadata.generation = None;
        state.assign_identity(&mut created);
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(object)?;
        let mut state = self.state();
        state.actions.updates.push(object.clone());
        state.check(Verb::Update, &key.kind)?;

        let stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        check_resource_version(&key, object, &stored)?;

        let mut updated = object.clone();
        if let Some(map) = updated.data.as_object_mut() {
            match stored.data.get("status") {
                Some(status) => map.insert("status".to_owned(), status.clone()),
                None => map.remove("status"),
            };
        }
        updated.metadata.uid = stored.metadata.uid.clone();
        let generation = stored.metadata.generation.unwrap_or(1);
        updated.metadata.generation = Some(if spec_of(&updated) == spec_of(&stored) {
            generation
        } else {
            generation + 1
        });
        updated.metadata.resource_version = Some(state.next().to_string());
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn update_status(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = key_of(object)?;
        let mut state = self.state();
        state.actions.status_updates.push(object.clone());
        state.check(Verb::UpdateStatus, &key.kind)?;

        let mut updated = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        check_resource_version(&key, object, &updated)?;

        if let Some(map) = updated.data.as_object_mut() {
            match object.data.get("status") {
                Some(status) => map.insert("status".to_owned(), status.clone()),
                None => map.remove("status"),
            };
        }
        updated.metadata.resource_version = Some(state.next().to_string());
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), StoreError> {
        let mut state = self.state();
        state.actions.deletes.push(key.clone());
        state.check(Verb::Delete, &key.kind)?;
        state
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{to_dynamic, TypedClient};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::sync::Arc;

    fn config_map(name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                ..ObjectMeta::default()
            },
            data: Some([("key".to_owned(), value.to_owned())].into()),
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn test_create_expands_generate_name() {
        let store = Arc::new(MemoryStore::new());
        let client = TypedClient::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let mut cm = config_map("ignored", "a");
        cm.metadata.name = None;
        cm.metadata.generate_name = Some("images-".to_owned());

        let created = client.create(&cm).await.unwrap();
        let name = created.metadata.name.unwrap();
        assert!(name.starts_with("images-"));
        assert_eq!(name.len(), "images-".len() + 5);
        assert!(created.metadata.uid.is_some());
        assert_eq!(store.actions().creates.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rejects_stale_resource_version() {
        let store = Arc::new(MemoryStore::new());
        let client = TypedClient::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let created = client.create(&config_map("images", "a")).await.unwrap();

        let mut first = created.clone();
        first.data = Some([("key".to_owned(), "b".to_owned())].into());
        client.update(&first).await.unwrap();

        let mut stale = created;
        stale.data = Some([("key".to_owned(), "c".to_owned())].into());
        let err = client.update(&stale).await.err().unwrap();
        assert!(err.is_conflict());
        assert_eq!(store.actions().updates.len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_logged_and_returned() {
        let store = Arc::new(MemoryStore::new());
        let client = TypedClient::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        store.fail_on(Verb::Create, "ConfigMap", "inducing failure for create configmaps");

        let err = client.create(&config_map("images", "a")).await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.actions().creates.len(), 1);
        assert!(store
            .object(&ResourceKey::of::<ConfigMap>("default", "images"))
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let store = MemoryStore::new();
        let mut labelled = to_dynamic(&config_map("a", "1")).unwrap();
        labelled.metadata.labels = Some([("role".to_owned(), "gateway".to_owned())].into());
        store.insert(labelled).unwrap();
        store.insert(to_dynamic(&config_map("b", "2")).unwrap()).unwrap();
        let mut elsewhere = to_dynamic(&config_map("c", "3")).unwrap();
        elsewhere.metadata.namespace = Some("other".to_owned());
        elsewhere.metadata.labels = Some([("role".to_owned(), "gateway".to_owned())].into());
        store.insert(elsewhere).unwrap();

        let gvk = GroupVersionKind::gvk("", "v1", "ConfigMap");
        let selector = ListSelector::default().label("role", "gateway");
        let found = store.list(&gvk, "default", &selector).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("a"));

        let everywhere = store.list(&gvk, "", &selector).await.unwrap();
        assert_eq!(everywhere.len(), 2);
    }

    #[tokio::test]
    async fn test_list_with_unregistered_index_fails() {
        let store = MemoryStore::new();
        let gvk = GroupVersionKind::gvk("", "v1", "ConfigMap");
        let selector = ListSelector::default().index(".metadata.controller", "x");
        let err = store.list(&gvk, "default", &selector).await.err().unwrap();
        assert!(matches!(err, StoreError::IndexNotRegistered { .. }));
    }
}
