//! # Reconciler Errors

use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Reasons a reconciliation pass fails
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A store call failed; propagated unchanged from the child or read that issued it
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Required external configuration is absent; retried until it appears
    #[error("missing {what}")]
    MissingConfiguration { what: String },

    #[error("object has no {0}")]
    MissingObjectKey(&'static str),

    /// Status write failed after the pass converged
    #[error("failed to update status: {0}")]
    StatusUpdate(#[source] StoreError),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl ReconcilerError {
    pub fn missing_configuration(what: impl Into<String>) -> Self {
        Self::MissingConfiguration { what: what.into() }
    }

    /// Lost an optimistic concurrency race; retry promptly with fresh state
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Store(e) | Self::StatusUpdate(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Short label for metrics and logs
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Store(StoreError::Conflict { .. }) | Self::StatusUpdate(StoreError::Conflict { .. }) => {
                "conflict"
            }
            Self::Store(_) => "store",
            Self::MissingConfiguration { .. } => "configuration",
            Self::MissingObjectKey(_) => "invalid-object",
            Self::StatusUpdate(_) => "status-update",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded(_) => "deadline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResourceKey;
    use k8s_openapi::api::apps::v1::Deployment;

    #[test]
    fn test_conflict_classification() {
        let conflict = || StoreError::Conflict {
            key: ResourceKey::of::<Deployment>("default", "web"),
            message: "stale".to_owned(),
        };
        assert!(ReconcilerError::Store(conflict()).is_conflict());
        assert!(ReconcilerError::StatusUpdate(conflict()).is_conflict());
        assert!(!ReconcilerError::Cancelled.is_conflict());
        assert_eq!(ReconcilerError::Store(conflict()).metric_label(), "conflict");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ReconcilerError::missing_configuration("gateway image configuration").to_string(),
            "missing gateway image configuration"
        );
        assert_eq!(
            ReconcilerError::StatusUpdate(StoreError::Unavailable("boom".to_owned())).to_string(),
            "failed to update status: store unavailable: boom"
        );
    }
}
