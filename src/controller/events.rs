//! # Events
//!
//! Fire-and-forget event recording. Recording never blocks a pass and never
//! fails it; publish errors are only logged.

use crate::constants::CONTROLLER_NAME;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::fmt::Debug;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

pub trait EventRecorder: Send + Sync + Debug {
    fn record(&self, regarding: &ObjectReference, severity: EventSeverity, reason: &str, message: String);
}

/// Publishes Kubernetes events through `kube::runtime::events::Recorder`
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_owned(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, regarding: &ObjectReference, severity: EventSeverity, reason: &str, message: String) {
        let event = Event {
            type_: match severity {
                EventSeverity::Normal => EventType::Normal,
                EventSeverity::Warning => EventType::Warning,
            },
            reason: reason.to_owned(),
            note: Some(message),
            action: "Reconcile".to_owned(),
            secondary: None,
        };
        let recorder = self.recorder.clone();
        let regarding = regarding.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &regarding).await {
                warn!(
                    reason = %event.reason,
                    object = ?regarding.name,
                    "Failed to publish event: {}",
                    e
                );
            }
        });
    }
}
