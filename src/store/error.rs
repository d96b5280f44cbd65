//! # Store Errors

use super::ResourceKey;
use thiserror::Error;

/// Failures at the object store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{key} not found")]
    NotFound { key: ResourceKey },

    #[error("{key} already exists")]
    AlreadyExists { key: ResourceKey },

    #[error("conflict writing {key}: {message}")]
    Conflict { key: ResourceKey, message: String },

    #[error("field index {field:?} is not registered for {kind}")]
    IndexNotRegistered { kind: String, field: String },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Map a kube client error for `key`, classifying the status codes the
    /// reconcilers branch on
    pub(crate) fn from_kube(err: kube::Error, key: &ResourceKey) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => Self::NotFound { key: key.clone() },
            kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
                Self::AlreadyExists { key: key.clone() }
            }
            kube::Error::Api(api_err) if api_err.code == 409 => Self::Conflict {
                key: key.clone(),
                message: api_err.message.clone(),
            },
            other => Self::Kube(other),
        }
    }
}
