//! Tracker and event recorder that remember every call, in order.

use crate::controller::{EventRecorder, EventSeverity, LeaseTracker, TrackRequest, Tracker};
use crate::store::ResourceKey;
use k8s_openapi::api::core::v1::ObjectReference;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Records every `track` call and answers lookups from a real lease tracker
#[derive(Debug)]
pub struct RecordingTracker {
    inner: LeaseTracker,
    requests: Mutex<Vec<TrackRequest>>,
}

impl Default for RecordingTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(3 * 10 * 60 * 60))
    }
}

impl RecordingTracker {
    pub fn new(lease: Duration) -> Self {
        Self {
            inner: LeaseTracker::new(lease),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TrackRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Tracker for RecordingTracker {
    fn track(&self, tracked: &ResourceKey, dependent: &ResourceKey) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TrackRequest {
                tracked: tracked.clone(),
                dependent: dependent.clone(),
                lease_expiry: Instant::now() + self.inner.lease(),
            });
        self.inner.track(tracked, dependent);
    }

    fn lookup(&self, tracked: &ResourceKey) -> Vec<ResourceKey> {
        self.inner.lookup(tracked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: String,
    pub name: String,
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RecordingRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of the recorded events, in order
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventRecorder for RecordingRecorder {
    fn record(&self, regarding: &ObjectReference, severity: EventSeverity, reason: &str, message: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                kind: regarding.kind.clone().unwrap_or_default(),
                name: regarding.name.clone().unwrap_or_default(),
                severity,
                reason: reason.to_owned(),
                message,
            });
    }
}
