//! # Reconciler Context
//!
//! Shared handles every pass works with: the store client, the dependency
//! tracker, the event recorder and configuration. All of them are injected,
//! so tests run each case against an isolated set.

use super::events::{EventRecorder, EventSeverity};
use super::tracker::Tracker;
use crate::config::ControllerConfig;
use crate::store::{Object, ResourceKey, StoreError, TypedClient};
use kube::core::DynamicObject;
use kube::Resource;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Context {
    pub client: TypedClient,
    pub tracker: Arc<dyn Tracker>,
    pub recorder: Arc<dyn EventRecorder>,
    pub config: Arc<ControllerConfig>,
}

impl Context {
    pub fn new(
        client: TypedClient,
        tracker: Arc<dyn Tracker>,
        recorder: Arc<dyn EventRecorder>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            client,
            tracker,
            recorder,
            config,
        }
    }

    /// Register `dependent`'s interest in the object, then read it. The
    /// registration happens even when the read fails, so the dependent hears
    /// about the object once it appears.
    pub async fn track_and_get<K: Object>(
        &self,
        dependent: &ResourceKey,
        namespace: &str,
        name: &str,
    ) -> Result<K, StoreError> {
        self.tracker
            .track(&ResourceKey::of::<K>(namespace, name), dependent);
        self.client.get(namespace, name).await
    }

    pub async fn track_and_get_dynamic(
        &self,
        dependent: &ResourceKey,
        key: &ResourceKey,
    ) -> Result<DynamicObject, StoreError> {
        self.tracker.track(key, dependent);
        self.client.get_dynamic(key).await
    }

    pub fn record<P>(&self, regarding: &P, severity: EventSeverity, reason: &str, message: String)
    where
        P: Resource<DynamicType = ()>,
    {
        self.recorder
            .record(&regarding.object_ref(&()), severity, reason, message);
    }
}
