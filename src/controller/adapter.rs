//! # Adapter Reconciler
//!
//! Follows the latest image of a build resource and writes it into a Knative
//! Service or Configuration. Neither side is owned: both are tracked so a
//! new build image, or a target that appears later, re-triggers the Adapter.

use super::conditions::ConditionSet;
use super::context::Context;
use super::engine::{Outcome, Parent, ParentReconciler};
use super::error::ReconcilerError;
use super::events::EventSeverity;
use crate::crd::external::{first_container_image, latest_image, set_first_container_image, status_condition};
use crate::crd::{
    Adapter, AdapterStatus, ADAPTER_CONDITION_BUILD_READY, ADAPTER_CONDITION_READY, ADAPTER_CONDITION_TARGET_FOUND,
};
use crate::store::{IndexRegistry, ResourceKey, StoreError};
use async_trait::async_trait;
use tracing::{debug, error, info};

impl Parent for Adapter {
    type Status = AdapterStatus;

    const CONDITIONS: ConditionSet = ConditionSet::new(
        ADAPTER_CONDITION_READY,
        &[ADAPTER_CONDITION_BUILD_READY, ADAPTER_CONDITION_TARGET_FOUND],
    );

    fn status(&self) -> Option<&AdapterStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut AdapterStatus {
        self.status.get_or_insert_with(AdapterStatus::default)
    }
}

#[derive(Debug, Default)]
pub struct AdapterReconciler;

#[async_trait]
impl ParentReconciler for AdapterReconciler {
    type Resource = Adapter;

    /// Adapters own nothing
    fn register_indexes(&self, _indexes: &IndexRegistry) {}

    async fn reconcile(&self, ctx: &Context, adapter: &mut Adapter) -> Result<Outcome, ReconcilerError> {
        let dependent = adapter.key()?;
        let namespace = adapter.require_namespace()?.to_owned();

        let Some((build_kind, build_name)) = adapter.spec.build.reference() else {
            adapter.conditions().mark_false(
                ADAPTER_CONDITION_BUILD_READY,
                "InvalidSpec",
                "exactly one of applicationRef, functionRef or containerRef must be set",
            );
            return Ok(Outcome::Done);
        };
        let build_key = ResourceKey::new(&build_kind.gvk(), namespace.as_str(), build_name);
        let build = match ctx.track_and_get_dynamic(&dependent, &build_key).await {
            Ok(build) => build,
            Err(StoreError::NotFound { .. }) => {
                debug!(build = %build_key, "Build not found");
                adapter.conditions().mark_unknown(
                    ADAPTER_CONDITION_BUILD_READY,
                    "NotFound",
                    format!("The {} {:?} was not found.", build_kind.noun(), build_key.name),
                );
                return Ok(Outcome::Done);
            }
            Err(e) => {
                error!(build = %build_key, error = %e, "Unable to read build");
                return Err(e.into());
            }
        };

        match status_condition(&build, "Ready") {
            Some(ready) => adapter
                .conditions()
                .propagate(ADAPTER_CONDITION_BUILD_READY, &ready),
            None => adapter.conditions().mark_unknown(
                ADAPTER_CONDITION_BUILD_READY,
                "BuildNotReady",
                format!("The {} {:?} has not reported readiness.", build_kind.noun(), build_key.name),
            ),
        }
        let Some(image) = latest_image(&build) else {
            debug!(build = %build_key, "Build has no latest image yet");
            return Ok(Outcome::Done);
        };
        adapter.status_mut().latest_image = Some(image.clone());

        let Some((target_kind, target_name)) = adapter.spec.target.reference() else {
            adapter.conditions().mark_false(
                ADAPTER_CONDITION_TARGET_FOUND,
                "InvalidSpec",
                "exactly one of serviceRef or configurationRef must be set",
            );
            return Ok(Outcome::Done);
        };
        let target_key = ResourceKey::new(&target_kind.gvk(), namespace.as_str(), target_name);
        let target = match ctx.track_and_get_dynamic(&dependent, &target_key).await {
            Ok(target) => target,
            Err(StoreError::NotFound { .. }) => {
                debug!(target = %target_key, "Target not found");
                adapter.conditions().mark_false(
                    ADAPTER_CONDITION_TARGET_FOUND,
                    "NotFound",
                    format!("The {} {:?} was not found.", target_kind.noun(), target_key.name),
                );
                return Ok(Outcome::Done);
            }
            Err(e) => {
                error!(target = %target_key, error = %e, "Unable to read target");
                return Err(e.into());
            }
        };
        adapter.conditions().mark_true(ADAPTER_CONDITION_TARGET_FOUND);

        if first_container_image(&target).as_deref() == Some(image.as_str()) {
            return Ok(Outcome::Done);
        }
        let mut updated = target.clone();
        if !set_first_container_image(&mut updated, &image) {
            adapter.conditions().mark_false(
                ADAPTER_CONDITION_TARGET_FOUND,
                "NoContainer",
                format!("The {} {:?} has no container to update.", target_kind.noun(), target_key.name),
            );
            return Ok(Outcome::Done);
        }
        match ctx.client.update_dynamic(&updated).await {
            Ok(_) => {
                info!(target = %target_key, image = %image, "Updated target image");
                ctx.record(
                    &*adapter,
                    EventSeverity::Normal,
                    "Updated",
                    format!("Updated {} {:?} to image {:?}", target_kind.noun(), target_key.name, image),
                );
                Ok(Outcome::Done)
            }
            Err(e) => {
                error!(target = %target_key, error = %e, "Unable to update target");
                ctx.record(
                    &*adapter,
                    EventSeverity::Warning,
                    "UpdateFailed",
                    format!("Failed to update {} {:?}: {}", target_kind.noun(), target_key.name, e),
                );
                Err(e.into())
            }
        }
    }
}
