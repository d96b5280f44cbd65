//! # Owned Children
//!
//! Converges the single child a parent owns in one role (for example the
//! gateway Deployment of a KafkaProvider).
//!
//! 1. List children in the parent's namespace by role label and owner index.
//! 2. More than one child is an anomaly: delete them all and continue as if
//!    none existed.
//! 3. Compute the desired child. `None` means the role is not wanted and an
//!    existing child is deleted.
//! 4. Create when absent. Otherwise carry over fields other actors own,
//!    compare the fields this controller owns and update a copy of the
//!    actual child when they differ.
//!
//! Every write is paired with an event on the parent, a log line and a
//! metric. Store failures abort the child and propagate to the caller.

use super::conditions::ConditionManager;
use super::context::Context;
use super::engine::Parent;
use super::error::ReconcilerError;
use super::events::EventSeverity;
use crate::observability::metrics;
use crate::store::{ListSelector, Object, StoreError};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{error, info};

/// A child kind the reconcilers own
pub trait ChildKind: Object {
    /// Copy fields that the store or other actors manage from `actual`
    fn preserve_from(&mut self, actual: &Self);

    /// The spec as JSON, `Null` when unset
    fn spec_value(&self) -> Result<Value, StoreError>;

    /// Overwrite this object's spec with `desired`'s
    fn set_spec_from(&mut self, desired: &Self);
}

impl ChildKind for Deployment {
    /// Replicas belong to whatever scales the Deployment
    fn preserve_from(&mut self, actual: &Self) {
        if let (Some(desired), Some(actual)) = (self.spec.as_mut(), actual.spec.as_ref()) {
            desired.replicas = actual.replicas;
        }
    }

    fn spec_value(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(&self.spec)?)
    }

    fn set_spec_from(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
    }
}

impl ChildKind for Service {
    /// The cluster IP is assigned by the API server and immutable
    fn preserve_from(&mut self, actual: &Self) {
        if let (Some(desired), Some(actual)) = (self.spec.as_mut(), actual.spec.as_ref()) {
            desired.cluster_ip.clone_from(&actual.cluster_ip);
            desired.cluster_ips.clone_from(&actual.cluster_ips);
        }
    }

    fn spec_value(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(&self.spec)?)
    }

    fn set_spec_from(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
    }
}

/// Mirror the Deployment's `Available` condition onto `r#type`
pub fn propagate_deployment_available(conditions: &mut ConditionManager<'_>, r#type: &str, deployment: &Deployment) {
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|c| c.iter().find(|c| c.type_ == "Available"));
    let Some(available) = available else {
        conditions.mark_unknown(r#type, "DeploymentUnavailable", "the deployment has not reported availability");
        return;
    };
    let reason = available.reason.as_deref().unwrap_or_default();
    let message = available.message.clone().unwrap_or_default();
    match available.status.as_str() {
        "True" => conditions.mark_true(r#type),
        "False" => conditions.mark_false(r#type, reason, message),
        _ => conditions.mark_unknown(r#type, reason, message),
    }
}

/// True when every field set in `desired` has the same value in `actual`.
///
/// Fields only present in `actual` are owned by someone else (typically
/// API server defaulting) and do not count as drift. Empty arrays and
/// objects in `desired` match an absent field.
pub fn owned_fields_equal(desired: &Value, actual: &Value) -> bool {
    match (desired, actual) {
        (Value::Null, _) => true,
        (Value::Object(desired), Value::Object(actual)) => desired.iter().all(|(k, v)| match actual.get(k) {
            Some(actual) => owned_fields_equal(v, actual),
            None => is_empty_value(v),
        }),
        (Value::Array(desired), Value::Array(actual)) => {
            desired.len() == actual.len()
                && desired
                    .iter()
                    .zip(actual)
                    .all(|(d, a)| owned_fields_equal(d, a))
        }
        (desired, Value::Null) => is_empty_value(desired),
        (desired, actual) => desired == actual,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.values().all(is_empty_value),
        _ => false,
    }
}

/// Spec and labels match, ignoring fields this controller does not set
pub fn semantic_equals<C: ChildKind>(desired: &C, actual: &C) -> Result<bool, StoreError> {
    if desired.meta().labels.clone().unwrap_or_default() != actual.meta().labels.clone().unwrap_or_default() {
        return Ok(false);
    }
    Ok(owned_fields_equal(&desired.spec_value()?, &actual.spec_value()?))
}

/// Reconciles the child of one role for one parent
pub struct ChildReconciler<'a, P: Parent, C: ChildKind> {
    ctx: &'a Context,
    parent: &'a P,
    role: &'static str,
    selector: ListSelector,
    _child: PhantomData<C>,
}

impl<'a, P: Parent, C: ChildKind> ChildReconciler<'a, P, C> {
    /// `role_label` selects children of this role, valued with the parent's
    /// name; `index_field` is the owner index registered for `C`
    pub fn new(
        ctx: &'a Context,
        parent: &'a P,
        role: &'static str,
        role_label: &str,
        index_field: &str,
    ) -> Result<Self, ReconcilerError> {
        let name = parent
            .meta()
            .name
            .as_deref()
            .ok_or(ReconcilerError::MissingObjectKey("name"))?;
        Ok(Self {
            ctx,
            parent,
            role,
            selector: ListSelector::default()
                .label(role_label, name)
                .index(index_field, name),
            _child: PhantomData,
        })
    }

    /// Converge the child and return it as it now exists, or `None` when
    /// the role is not wanted
    pub async fn reconcile<F>(&self, desired: F) -> Result<Option<C>, ReconcilerError>
    where
        F: FnOnce() -> Result<Option<C>, ReconcilerError>,
    {
        let namespace = self.parent.require_namespace()?;
        let mut children: Vec<C> = self.ctx.client.list(namespace, &self.selector).await?;

        let actual = match children.len() {
            0 => None,
            1 => children.pop(),
            _ => {
                for extra in &children {
                    self.delete(extra).await?;
                }
                None
            }
        };

        let Some(mut desired) = desired()? else {
            if let Some(actual) = &actual {
                self.delete(actual).await?;
            }
            return Ok(None);
        };
        self.adopt(&mut desired, namespace);

        let Some(actual) = actual else {
            return self.create(&desired).await.map(Some);
        };

        desired.preserve_from(&actual);
        if semantic_equals(&desired, &actual)? {
            return Ok(Some(actual));
        }

        let mut updated = actual.clone();
        updated.meta_mut().labels.clone_from(&desired.meta().labels);
        updated.set_spec_from(&desired);
        self.update(&updated).await.map(Some)
    }

    fn kind() -> String {
        C::kind(&()).into_owned()
    }

    /// Namespace and controller owner reference of the parent
    fn adopt(&self, desired: &mut C, namespace: &str) {
        let meta = desired.meta_mut();
        meta.namespace = Some(namespace.to_owned());
        if let Some(owner) = self.parent.controller_owner_ref(&()) {
            meta.owner_references = Some(vec![owner]);
        }
    }

    async fn create(&self, desired: &C) -> Result<C, ReconcilerError> {
        let kind = Self::kind();
        let display_name = desired
            .meta()
            .name
            .clone()
            .or_else(|| desired.meta().generate_name.clone())
            .unwrap_or_default();
        match self.ctx.client.create(desired).await {
            Ok(created) => {
                let name = created.meta().name.clone().unwrap_or_default();
                info!(child.kind = %kind, child.role = self.role, child.name = %name, "Created child");
                metrics::increment_child_operations(&kind, "create");
                self.event(EventSeverity::Normal, "Created", format!("Created {} {} {:?}", self.role, kind, name));
                Ok(created)
            }
            Err(e) => {
                error!(child.kind = %kind, child.role = self.role, error = %e, "Unable to create child");
                self.event(
                    EventSeverity::Warning,
                    "CreationFailed",
                    format!("Failed to create {} {} {:?}: {}", self.role, kind, display_name, e),
                );
                Err(e.into())
            }
        }
    }

    async fn update(&self, updated: &C) -> Result<C, ReconcilerError> {
        let kind = Self::kind();
        let name = updated.meta().name.clone().unwrap_or_default();
        match self.ctx.client.update(updated).await {
            Ok(result) => {
                info!(child.kind = %kind, child.role = self.role, child.name = %name, "Updated child");
                metrics::increment_child_operations(&kind, "update");
                self.event(EventSeverity::Normal, "Updated", format!("Updated {} {} {:?}", self.role, kind, name));
                Ok(result)
            }
            Err(e) => {
                error!(child.kind = %kind, child.role = self.role, child.name = %name, error = %e, "Unable to update child");
                self.event(
                    EventSeverity::Warning,
                    "UpdateFailed",
                    format!("Failed to update {} {} {:?}: {}", self.role, kind, name, e),
                );
                Err(e.into())
            }
        }
    }

    async fn delete(&self, child: &C) -> Result<(), ReconcilerError> {
        let kind = Self::kind();
        let name = child.meta().name.clone().unwrap_or_default();
        match self.ctx.client.delete(child).await {
            // already gone is as good as deleted
            Ok(()) | Err(StoreError::NotFound { .. }) => {
                info!(child.kind = %kind, child.role = self.role, child.name = %name, "Deleted child");
                metrics::increment_child_operations(&kind, "delete");
                self.event(EventSeverity::Normal, "Deleted", format!("Deleted {} {} {:?}", self.role, kind, name));
                Ok(())
            }
            Err(e) => {
                error!(child.kind = %kind, child.role = self.role, child.name = %name, error = %e, "Unable to delete child");
                self.event(
                    EventSeverity::Warning,
                    "DeleteFailed",
                    format!("Failed to delete {} {} {:?}: {}", self.role, kind, name, e),
                );
                Err(e.into())
            }
        }
    }

    fn event(&self, severity: EventSeverity, reason: &str, message: String) {
        self.ctx.record(self.parent, severity, reason, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_owned_fields_ignore_server_defaults() {
        let desired = json!({
            "selector": {"matchLabels": {"app": "gw"}},
            "template": {"spec": {"containers": [{"name": "gateway", "image": "gw:1", "env": []}]}}
        });
        let actual = json!({
            "replicas": 1,
            "revisionHistoryLimit": 10,
            "selector": {"matchLabels": {"app": "gw"}},
            "template": {"spec": {
                "containers": [{"name": "gateway", "image": "gw:1", "terminationMessagePath": "/dev/termination-log"}],
                "restartPolicy": "Always"
            }}
        });
        assert!(owned_fields_equal(&desired, &actual));
    }

    #[test]
    fn test_owned_fields_detect_drift() {
        let desired = json!({"template": {"spec": {"containers": [{"image": "gw:2"}]}}});
        let actual = json!({"template": {"spec": {"containers": [{"image": "gw:1"}]}}});
        assert!(!owned_fields_equal(&desired, &actual));

        let extra_container = json!({"template": {"spec": {"containers": [{"image": "gw:2"}, {"image": "sidecar"}]}}});
        assert!(!owned_fields_equal(&desired, &extra_container));

        let missing = json!({"ports": [{"port": 80}]});
        assert!(!owned_fields_equal(&missing, &json!({})));
    }

    /// ConfigMap stand-in whose spec never serializes
    impl ChildKind for k8s_openapi::api::core::v1::ConfigMap {
        fn preserve_from(&mut self, _actual: &Self) {}

        fn spec_value(&self) -> Result<Value, StoreError> {
            Err(serde_json::from_str::<Value>("{").unwrap_err().into())
        }

        fn set_spec_from(&mut self, _desired: &Self) {}
    }

    #[test]
    fn test_unserializable_spec_is_an_error_not_a_match() {
        let config_map = k8s_openapi::api::core::v1::ConfigMap::default();
        let err = semantic_equals(&config_map, &config_map).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_service_preserves_cluster_ip() {
        use k8s_openapi::api::core::v1::ServiceSpec;
        let mut desired = Service {
            spec: Some(ServiceSpec::default()),
            ..Service::default()
        };
        let actual = Service {
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_owned()),
                cluster_ips: Some(vec!["10.0.0.12".to_owned()]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };
        desired.preserve_from(&actual);
        assert_eq!(
            desired.spec.as_ref().and_then(|s| s.cluster_ip.as_deref()),
            Some("10.0.0.12")
        );
        assert!(semantic_equals(&desired, &actual).unwrap());
    }

    #[test]
    fn test_deployment_preserves_replicas() {
        use k8s_openapi::api::apps::v1::DeploymentSpec;
        let mut desired = Deployment {
            spec: Some(DeploymentSpec::default()),
            ..Deployment::default()
        };
        let actual = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(5),
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };
        desired.preserve_from(&actual);
        assert_eq!(desired.spec.and_then(|s| s.replicas), Some(5));
    }

    #[test]
    fn test_propagate_deployment_available() {
        use crate::controller::conditions::ConditionSet;
        use crate::crd::ConditionStatus;
        use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};

        const SET: ConditionSet = ConditionSet::new("Ready", &["DeploymentReady"]);
        let with_available = |status: &str| Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(vec![DeploymentCondition {
                    type_: "Available".to_owned(),
                    status: status.to_owned(),
                    reason: Some("MinimumReplicasUnavailable".to_owned()),
                    message: Some("Deployment does not have minimum availability.".to_owned()),
                    ..DeploymentCondition::default()
                }]),
                ..DeploymentStatus::default()
            }),
            ..Deployment::default()
        };

        let mut conditions = Vec::new();
        SET.initialize(&mut conditions);
        let mut manager = SET.manage(&mut conditions);
        propagate_deployment_available(&mut manager, "DeploymentReady", &with_available("False"));
        let ready = manager.get("DeploymentReady").unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason.as_deref(), Some("MinimumReplicasUnavailable"));

        propagate_deployment_available(&mut manager, "DeploymentReady", &with_available("True"));
        assert!(manager.is_ready());

        propagate_deployment_available(&mut manager, "DeploymentReady", &Deployment::default());
        assert_eq!(manager.get("DeploymentReady").unwrap().status, ConditionStatus::Unknown);
    }
}
