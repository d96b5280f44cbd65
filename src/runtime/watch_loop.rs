//! # Watch Loop
//!
//! One `kube_runtime::Controller` per parent kind. Each one watches its
//! parents, the children it owns, and every kind its passes read without
//! owning. A change to a read-only object is mapped to the parents that
//! registered interest in it through the dependency tracker.
//!
//! ```text
//! parent event ─────────────────────────────┐
//! owned child event ── owner reference ─────┼─► Engine::reconcile ─► Action
//! tracked object event ── Tracker::lookup ──┘
//! ```

use super::error_policy::{handle_reconciliation_error, handle_watch_stream_error, Backoff};
use crate::controller::{
    AdapterReconciler, Context, Engine, KafkaProviderReconciler, LeaseTracker, Outcome, ParentReconciler,
    ProcessorReconciler, ReconcilerError, Tracker,
};
use crate::crd::external::{stream_gvk, BuildKind, TargetKind};
use crate::crd::{
    Adapter, KafkaProvider, Processor, KAFKA_PROVIDER_LABEL_KEY, PROCESSOR_LABEL_KEY,
};
use crate::observability::metrics;
use crate::store::{gvk_of, ResourceKey};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Config as ControllerRuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a controller's reconcile and error policy callbacks share
pub struct Dispatcher<R: ParentReconciler> {
    pub engine: Engine<R>,
    pub backoff: Backoff,
    pub cancel: CancellationToken,
}

impl<R: ParentReconciler> Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engine", &self.engine)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<R: ParentReconciler> Dispatcher<R> {
    pub fn new(ctx: Context, reconciler: R, cancel: CancellationToken) -> Self {
        let backoff = Backoff::new(ctx.config.backoff_base, ctx.config.backoff_max);
        Self {
            engine: Engine::new(ctx, reconciler),
            backoff,
            cancel,
        }
    }

    /// Turn a pass outcome into the scheduler's next action
    pub fn action_for(&self, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Done => Action::requeue(self.engine.context().config.resync_period),
            Outcome::Requeue => {
                metrics::increment_requeues_total("requested");
                Action::requeue(Duration::ZERO)
            }
            Outcome::RequeueAfter(delay) => {
                metrics::increment_requeues_total("requested-after");
                Action::requeue(delay)
            }
        }
    }
}

async fn reconcile<R: ParentReconciler>(
    obj: Arc<R::Resource>,
    dispatcher: Arc<Dispatcher<R>>,
) -> Result<Action, ReconcilerError> {
    let namespace = obj
        .meta()
        .namespace
        .as_deref()
        .ok_or(ReconcilerError::MissingObjectKey("namespace"))?;
    let name = obj
        .meta()
        .name
        .as_deref()
        .ok_or(ReconcilerError::MissingObjectKey("name"))?;

    let outcome = dispatcher
        .engine
        .reconcile(namespace, name, &dispatcher.cancel)
        .await?;
    dispatcher.backoff.reset(&format!("{namespace}/{name}"));
    Ok(dispatcher.action_for(outcome))
}

/// Parents of kind `P` that read the object identified by `key`
fn dependents_of<P>(tracker: &dyn Tracker, key: &ResourceKey) -> Vec<ObjectRef<P>>
where
    P: Resource<DynamicType = ()>,
{
    let parent = gvk_of::<P>();
    tracker
        .lookup(key)
        .into_iter()
        .filter(|dependent| dependent.is_kind(&parent))
        .map(|dependent| ObjectRef::new(&dependent.name).within(&dependent.namespace))
        .collect()
}

/// Mapper for a typed tracked kind `K`
fn tracked_mapper<K, P>(tracker: Arc<LeaseTracker>) -> impl Fn(K) -> Vec<ObjectRef<P>> + Send + Sync + 'static
where
    K: Resource<DynamicType = ()>,
    P: Resource<DynamicType = ()>,
{
    move |obj: K| {
        ResourceKey::for_object(&obj)
            .map(|key| dependents_of::<P>(tracker.as_ref(), &key))
            .unwrap_or_default()
    }
}

/// Mapper for a tracked kind only known by its GVK
fn dynamic_mapper<P>(
    tracker: Arc<LeaseTracker>,
    gvk: GroupVersionKind,
) -> impl Fn(DynamicObject) -> Vec<ObjectRef<P>> + Send + Sync + 'static
where
    P: Resource<DynamicType = ()>,
{
    move |obj: DynamicObject| {
        let Some(name) = obj.metadata.name.as_deref() else {
            return Vec::new();
        };
        let namespace = obj.metadata.namespace.as_deref().unwrap_or_default();
        dependents_of::<P>(tracker.as_ref(), &ResourceKey::new(&gvk, namespace, name))
    }
}

fn watch_dynamic<P>(
    controller: Controller<P>,
    client: &Client,
    tracker: &Arc<LeaseTracker>,
    gvk: &GroupVersionKind,
) -> Controller<P>
where
    P: Resource<DynamicType = ()> + Clone + Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let resource = ApiResource::from_gvk(gvk);
    controller.watches_with(
        Api::<DynamicObject>::all_with(client.clone(), &resource),
        resource,
        watcher::Config::default(),
        dynamic_mapper::<P>(Arc::clone(tracker), gvk.clone()),
    )
}

/// Drive `controller` until shutdown, logging every outcome
async fn drive<R: ParentReconciler>(controller: Controller<R::Resource>, dispatcher: Arc<Dispatcher<R>>) {
    let kind = R::Resource::kind(&()).into_owned();
    let concurrency = dispatcher.engine.context().config.reconcile_concurrency;
    info!(kind = %kind, concurrency, "Starting controller");
    controller
        .with_config(ControllerRuntimeConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<R>, handle_reconciliation_error::<R>, dispatcher)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((obj, _action)) => debug!(kind = %kind, resource = %obj, "Reconciled"),
                    Err(kube_runtime::controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(e) => handle_watch_stream_error(&kind, &e.to_string()),
                }
            }
        })
        .await;
    info!(kind = %kind, "Controller stopped");
}

/// Periodically prune expired tracker leases until cancelled
pub async fn run_tracker_gc(tracker: Arc<LeaseTracker>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let pruned = tracker.gc();
                metrics::increment_tracker_pruned(pruned);
                metrics::set_tracker_entries(tracker.len());
                if pruned > 0 {
                    debug!(pruned, remaining = tracker.len(), "Pruned expired tracker leases");
                }
            }
        }
    }
}

/// Cancel `cancel` on SIGTERM or SIGINT
pub async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    info!("Shutdown signal received, cancelling in-flight reconciliations");
    cancel.cancel();
}

/// Run the three parent controllers and the tracker GC until shutdown
pub async fn run_watch_loop(
    client: Client,
    ctx: Context,
    tracker: Arc<LeaseTracker>,
    cancel: CancellationToken,
) {
    let config = Arc::clone(&ctx.config);
    let images_config_maps = || Api::<ConfigMap>::namespaced(client.clone(), &config.system_namespace);

    // KafkaProvider: owns gateway and provisioner Deployments and Services
    let kafka_provider = Arc::new(Dispatcher::new(
        ctx.clone(),
        KafkaProviderReconciler::new(),
        cancel.clone(),
    ));
    let owned = watcher::Config::default().labels(KAFKA_PROVIDER_LABEL_KEY);
    let kafka_provider_controller = Controller::new(Api::<KafkaProvider>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Deployment>::all(client.clone()), owned.clone())
        .owns(Api::<Service>::all(client.clone()), owned)
        .watches(
            images_config_maps(),
            watcher::Config::default(),
            tracked_mapper::<ConfigMap, KafkaProvider>(Arc::clone(&tracker)),
        );

    // Adapter: reads builds and Knative targets, owns nothing
    let adapter = Arc::new(Dispatcher::new(ctx.clone(), AdapterReconciler, cancel.clone()));
    let mut adapter_controller = Controller::new(Api::<Adapter>::all(client.clone()), watcher::Config::default());
    for gvk in [BuildKind::Application, BuildKind::Function, BuildKind::Container]
        .map(BuildKind::gvk)
        .into_iter()
        .chain([TargetKind::Service, TargetKind::Configuration].map(TargetKind::gvk))
    {
        adapter_controller = watch_dynamic(adapter_controller, &client, &tracker, &gvk);
    }

    // Processor: owns its Deployment, reads the Function, Streams and images
    let processor = Arc::new(Dispatcher::new(ctx, ProcessorReconciler::new(), cancel.clone()));
    let mut processor_controller = Controller::new(Api::<Processor>::all(client.clone()), watcher::Config::default())
        .owns(
            Api::<Deployment>::all(client.clone()),
            watcher::Config::default().labels(PROCESSOR_LABEL_KEY),
        )
        .watches(
            images_config_maps(),
            watcher::Config::default(),
            tracked_mapper::<ConfigMap, Processor>(Arc::clone(&tracker)),
        );
    processor_controller = watch_dynamic(processor_controller, &client, &tracker, &BuildKind::Function.gvk());
    processor_controller = watch_dynamic(processor_controller, &client, &tracker, &stream_gvk());

    info!("Controllers configured, starting watch loop...");
    tokio::join!(
        drive(kafka_provider_controller, kafka_provider),
        drive(adapter_controller, adapter),
        drive(processor_controller, processor),
        run_tracker_gc(Arc::clone(&tracker), config.tracker_gc_interval, cancel.clone()),
        async {
            tokio::select! {
                () = cancel_on_signal(cancel.clone()) => {}
                () = cancel.cancelled() => {}
            }
        },
    );
}
