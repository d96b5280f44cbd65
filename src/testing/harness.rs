//! In-memory reconciliation harness.

use super::recorders::{RecordingRecorder, RecordingTracker};
use crate::config::ControllerConfig;
use crate::controller::{Context, Engine, Outcome, ParentReconciler, ReconcilerError};
use crate::store::{from_dynamic, gvk_of, to_dynamic, MemoryStore, Object, ResourceKey, StoreError, TypedClient};
use kube::core::DynamicObject;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A context backed by a [`MemoryStore`] and recording seams.
///
/// Each harness is isolated: cases never share store state, tracker
/// registrations or events.
#[derive(Debug)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub tracker: Arc<RecordingTracker>,
    pub recorder: Arc<RecordingRecorder>,
    ctx: Context,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(RecordingTracker::new(config.tracker_lease()));
        let recorder = Arc::new(RecordingRecorder::default());
        let ctx = Context::new(
            TypedClient::new(Arc::clone(&store) as Arc<dyn crate::store::ObjectStore>),
            Arc::clone(&tracker) as Arc<dyn crate::controller::Tracker>,
            Arc::clone(&recorder) as Arc<dyn crate::controller::EventRecorder>,
            Arc::new(config),
        );
        Self {
            store,
            tracker,
            recorder,
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Engine for `reconciler`, registering its indexes on the store
    pub fn engine<R: ParentReconciler>(&self, reconciler: R) -> Engine<R> {
        Engine::new(self.ctx.clone(), reconciler)
    }

    /// Run one pass for `namespace/name`
    pub async fn reconcile<R: ParentReconciler>(
        &self,
        engine: &Engine<R>,
        namespace: &str,
        name: &str,
    ) -> Result<Outcome, ReconcilerError> {
        engine
            .reconcile(namespace, name, &CancellationToken::new())
            .await
    }

    /// Seed a typed object, returning it as stored (with uid and resourceVersion)
    pub fn seed<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        from_dynamic(self.store.insert(to_dynamic(obj)?)?)
    }

    pub fn seed_dynamic(&self, obj: DynamicObject) -> Result<DynamicObject, StoreError> {
        self.store.insert(obj)
    }

    pub fn get<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
        self.store
            .object(&ResourceKey::of::<K>(namespace, name))
            .and_then(|obj| from_dynamic(obj).ok())
    }

    /// Every stored object of kind `K`
    pub fn all<K: Object>(&self) -> Vec<K> {
        self.store
            .objects_of(&gvk_of::<K>())
            .into_iter()
            .filter_map(|obj| from_dynamic(obj).ok())
            .collect()
    }

    /// Decode submitted objects from the action log as `K`, skipping other kinds
    pub fn decode<K: Object>(objects: &[DynamicObject]) -> Vec<K> {
        let gvk = gvk_of::<K>();
        objects
            .iter()
            .filter(|obj| ResourceKey::for_dynamic(obj).is_some_and(|key| key.is_kind(&gvk)))
            .filter_map(|obj| from_dynamic(obj.clone()).ok())
            .collect()
    }
}
