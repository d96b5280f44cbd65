//! # Reconciliation Engine
//!
//! The fetch, default, delegate, commit skeleton shared by every parent kind.
//!
//! ```text
//! Fetch ─┬─ not found ─────────────► Done
//!        ├─ being deleted ─────────► Done
//!        └─ live ─► Default & InitConditions ─► Delegate ─► Commit
//! ```
//!
//! Delegate runs the kind-specific [`ParentReconciler`] against a private
//! copy of the parent, bounded by the reconcile timeout and the
//! cancellation token. Commit writes status only when it differs
//! semantically from what was fetched and the pass did not ask for an
//! immediate requeue. A failed Delegate never commits.

use super::conditions::{ConditionManager, ConditionSet};
use super::context::Context;
use super::error::ReconcilerError;
use super::events::EventSeverity;
use crate::crd::ConditionedStatus;
use crate::observability::metrics;
use crate::store::{IndexRegistry, Object, ResourceKey};
use async_trait::async_trait;
use kube::Resource;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// What the driving scheduler should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next event or resync
    Done,
    /// Run again immediately; status is not committed
    Requeue,
    RequeueAfter(Duration),
}

/// A reconciled custom resource with a condition-carrying status
pub trait Parent: Object {
    type Status: ConditionedStatus + Clone + Default + PartialEq + Debug + Send + Sync;

    const CONDITIONS: ConditionSet;

    fn status(&self) -> Option<&Self::Status>;

    fn status_mut(&mut self) -> &mut Self::Status;

    /// Fill in defaulted spec fields
    fn default_fields(&mut self) {}

    fn initialize_conditions(&mut self) {
        Self::CONDITIONS.initialize(self.status_mut().conditions_mut());
    }

    fn conditions(&mut self) -> ConditionManager<'_> {
        Self::CONDITIONS.manage(self.status_mut().conditions_mut())
    }

    fn key(&self) -> Result<ResourceKey, ReconcilerError> {
        ResourceKey::for_object(self).ok_or(ReconcilerError::MissingObjectKey("name"))
    }

    fn require_namespace(&self) -> Result<&str, ReconcilerError> {
        self.meta()
            .namespace
            .as_deref()
            .ok_or(ReconcilerError::MissingObjectKey("namespace"))
    }
}

/// Kind-specific reconciliation logic
#[async_trait]
pub trait ParentReconciler: Send + Sync + 'static {
    type Resource: Parent;

    /// Field indexes the owned-child listings of this kind rely on
    fn register_indexes(&self, indexes: &IndexRegistry);

    /// Converge children and set leaf conditions on `parent`
    async fn reconcile(
        &self,
        ctx: &Context,
        parent: &mut Self::Resource,
    ) -> Result<Outcome, ReconcilerError>;
}

/// Status equality ignoring condition transition times
pub fn status_semantic_eq<S>(a: Option<&S>, b: Option<&S>) -> bool
where
    S: ConditionedStatus + Clone + Default + PartialEq,
{
    let normalize = |s: Option<&S>| {
        let mut s = s.cloned().unwrap_or_default();
        for condition in s.conditions_mut() {
            condition.last_transition_time = None;
        }
        s
    };
    normalize(a) == normalize(b)
}

pub struct Engine<R: ParentReconciler> {
    ctx: Context,
    reconciler: R,
}

impl<R: ParentReconciler> Debug for Engine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &R::Resource::kind(&()))
            .finish_non_exhaustive()
    }
}

impl<R: ParentReconciler> Engine<R> {
    pub fn new(ctx: Context, reconciler: R) -> Self {
        reconciler.register_indexes(ctx.client.indexes());
        Self { ctx, reconciler }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run one pass for `namespace/name`
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcilerError> {
        let kind = R::Resource::kind(&());
        let span = tracing::info_span!(
            "controller.reconcile",
            resource.kind = %kind,
            resource.namespace = namespace,
            resource.name = name
        );
        async move {
            let start = Instant::now();
            metrics::increment_reconciliations(&kind);
            let result = self.run(namespace, name, cancel).await;
            metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics::increment_reconciliation_errors(&kind);
                error!(error = %e, "Reconciliation failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ReconcilerError> {
        let original = match self.ctx.client.get::<R::Resource>(namespace, name).await {
            Ok(parent) => parent,
            Err(e) if e.is_not_found() => {
                debug!("Resource no longer exists, nothing to do");
                return Ok(Outcome::Done);
            }
            Err(e) => return Err(e.into()),
        };
        if original.meta().deletion_timestamp.is_some() {
            debug!("Resource is being deleted, children are garbage collected");
            return Ok(Outcome::Done);
        }

        let mut parent = original.clone();
        parent.default_fields();
        parent.initialize_conditions();

        let timeout = self.ctx.config.reconcile_timeout;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReconcilerError::Cancelled),
            result = tokio::time::timeout(timeout, self.reconciler.reconcile(&self.ctx, &mut parent)) => {
                result.unwrap_or(Err(ReconcilerError::DeadlineExceeded(timeout)))
            }
        }?;

        self.commit(&original, parent, outcome).await?;
        Ok(outcome)
    }

    async fn commit(
        &self,
        original: &R::Resource,
        mut parent: R::Resource,
        outcome: Outcome,
    ) -> Result<(), ReconcilerError> {
        let generation = parent.meta().generation;
        let status = parent.status_mut();
        status.set_observed_generation(generation);
        R::Resource::CONDITIONS.recompute(status.conditions_mut());

        if outcome == Outcome::Requeue {
            debug!("Skipping status update - immediate requeue requested");
            return Ok(());
        }
        if status_semantic_eq(original.status(), parent.status()) {
            debug!("Skipping status update - status unchanged");
            return Ok(());
        }

        info!(status = ?parent.status(), "Updating status");
        match self.ctx.client.update_status(&parent).await {
            Ok(_) => {
                metrics::increment_status_updates(&R::Resource::kind(&()));
                self.ctx.record(
                    &parent,
                    EventSeverity::Normal,
                    "StatusUpdated",
                    "Updated status".to_owned(),
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Unable to update status");
                self.ctx.record(
                    &parent,
                    EventSeverity::Warning,
                    "StatusUpdateFailed",
                    format!("Failed to update status: {e}"),
                );
                Err(ReconcilerError::StatusUpdate(e))
            }
        }
    }
}
