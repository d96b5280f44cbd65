//! Adapter reconciliation against the in-memory store.

use kube::core::DynamicObject;
use riff_system_controller::controller::{AdapterReconciler, EventSeverity, ReconcilerError, Tracker};
use riff_system_controller::crd::external::{BuildKind, TargetKind};
use riff_system_controller::crd::{
    Adapter, AdapterTarget, Condition, ConditionStatus, ADAPTER_CONDITION_BUILD_READY, ADAPTER_CONDITION_READY,
    ADAPTER_CONDITION_TARGET_FOUND,
};
use riff_system_controller::store::{ResourceKey, Verb};
use riff_system_controller::testing::{factories, Harness};
use serde_json::json;

const NAMESPACE: &str = "default";
const NAME: &str = "my-adapter";

fn condition(adapter: &Adapter, r#type: &str) -> Condition {
    adapter
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == r#type))
        .cloned()
        .unwrap()
}

fn stored_adapter(harness: &Harness) -> Adapter {
    harness.get(NAMESPACE, NAME).unwrap()
}

fn target_key(kind: TargetKind, name: &str) -> ResourceKey {
    ResourceKey::new(&kind.gvk(), NAMESPACE, name)
}

#[tokio::test]
async fn test_missing_function_is_unknown_and_tracked() {
    let harness = Harness::new();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let requests = harness.tracker.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].tracked,
        ResourceKey::new(&BuildKind::Function.gvk(), NAMESPACE, "my-function")
    );
    let adapter = stored_adapter(&harness);
    let build_ready = condition(&adapter, ADAPTER_CONDITION_BUILD_READY);
    assert_eq!(build_ready.status, ConditionStatus::Unknown);
    assert_eq!(build_ready.reason.as_deref(), Some("NotFound"));
    assert_eq!(
        build_ready.message.as_deref(),
        Some("The function \"my-function\" was not found.")
    );
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_READY).status, ConditionStatus::Unknown);
    assert!(harness.store.actions().updates.is_empty());
}

#[tokio::test]
async fn test_latest_image_is_written_into_service() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Function,
            NAMESPACE,
            "my-function",
            Some("registry.example/square@sha256:abc"),
            Some("True"),
        ))
        .unwrap();
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Service,
            NAMESPACE,
            "my-service",
            "registry.example/square@sha256:old",
        ))
        .unwrap();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let updates = harness.store.actions().updates;
    assert_eq!(updates.len(), 1);
    let spec = &updates[0].data["spec"];
    assert_eq!(
        spec["template"]["spec"]["containers"][0]["image"],
        json!("registry.example/square@sha256:abc")
    );
    assert_eq!(spec["template"]["spec"]["containers"][0]["env"][0]["name"], json!("MODE"));
    assert_eq!(
        spec["template"]["metadata"]["annotations"]["autoscaling.knative.dev/minScale"],
        json!("1")
    );
    assert_eq!(spec["traffic"][0]["percent"], json!(100));

    let tracked: Vec<String> = harness
        .tracker
        .requests()
        .into_iter()
        .map(|r| r.tracked.kind)
        .collect();
    assert_eq!(tracked, vec!["Function", "Service"]);

    let adapter = stored_adapter(&harness);
    assert_eq!(
        adapter.status.as_ref().and_then(|s| s.latest_image.as_deref()),
        Some("registry.example/square@sha256:abc")
    );
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_BUILD_READY).status, ConditionStatus::True);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_TARGET_FOUND).status, ConditionStatus::True);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_READY).status, ConditionStatus::True);
    assert_eq!(harness.recorder.reasons(), vec!["Updated", "StatusUpdated"]);
}

#[tokio::test]
async fn test_configuration_target_is_supported() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Container,
            NAMESPACE,
            "my-container",
            Some("registry.example/app@sha256:new"),
            Some("True"),
        ))
        .unwrap();
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Configuration,
            NAMESPACE,
            "my-configuration",
            "registry.example/app@sha256:old",
        ))
        .unwrap();
    let mut adapter = factories::adapter(NAMESPACE, NAME, "unused", "unused");
    adapter.spec.build.function_ref = None;
    adapter.spec.build.container_ref = Some("my-container".to_owned());
    adapter.spec.target = AdapterTarget {
        configuration_ref: Some("my-configuration".to_owned()),
        ..AdapterTarget::default()
    };
    harness.seed(&adapter).unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let stored: DynamicObject = harness
        .store
        .object(&target_key(TargetKind::Configuration, "my-configuration"))
        .unwrap();
    assert_eq!(
        stored.data["spec"]["template"]["spec"]["containers"][0]["image"],
        json!("registry.example/app@sha256:new")
    );
}

#[tokio::test]
async fn test_target_already_current_is_left_alone() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Application,
            NAMESPACE,
            "my-app",
            Some("registry.example/app@sha256:same"),
            Some("True"),
        ))
        .unwrap();
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Service,
            NAMESPACE,
            "my-service",
            "registry.example/app@sha256:same",
        ))
        .unwrap();
    let mut adapter = factories::adapter(NAMESPACE, NAME, "unused", "my-service");
    adapter.spec.build.function_ref = None;
    adapter.spec.build.application_ref = Some("my-app".to_owned());
    harness.seed(&adapter).unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let actions = harness.store.actions();
    assert!(actions.updates.is_empty());
    assert_eq!(actions.status_updates.len(), 1);
    assert_eq!(
        condition(&stored_adapter(&harness), ADAPTER_CONDITION_READY).status,
        ConditionStatus::True
    );
}

#[tokio::test]
async fn test_build_not_ready_still_reports_image() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Function,
            NAMESPACE,
            "my-function",
            Some("registry.example/square@sha256:abc"),
            None,
        ))
        .unwrap();
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Service,
            NAMESPACE,
            "my-service",
            "registry.example/square@sha256:abc",
        ))
        .unwrap();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let adapter = stored_adapter(&harness);
    let build_ready = condition(&adapter, ADAPTER_CONDITION_BUILD_READY);
    assert_eq!(build_ready.status, ConditionStatus::Unknown);
    assert_eq!(build_ready.reason.as_deref(), Some("BuildNotReady"));
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_TARGET_FOUND).status, ConditionStatus::True);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_READY).status, ConditionStatus::Unknown);
}

#[tokio::test]
async fn test_build_without_image_stops_before_target() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(BuildKind::Function, NAMESPACE, "my-function", None, Some("Unknown")))
        .unwrap();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    assert_eq!(harness.tracker.requests().len(), 1);
    let adapter = stored_adapter(&harness);
    assert_eq!(adapter.status.as_ref().and_then(|s| s.latest_image.clone()), None);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_TARGET_FOUND).status, ConditionStatus::Unknown);
}

#[tokio::test]
async fn test_missing_target_is_false_until_it_appears() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Function,
            NAMESPACE,
            "my-function",
            Some("registry.example/square@sha256:abc"),
            Some("True"),
        ))
        .unwrap();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let target_found = condition(&stored_adapter(&harness), ADAPTER_CONDITION_TARGET_FOUND);
    assert_eq!(target_found.status, ConditionStatus::False);
    assert_eq!(target_found.reason.as_deref(), Some("NotFound"));
    assert_eq!(
        target_found.message.as_deref(),
        Some("The service \"my-service\" was not found.")
    );
    assert_eq!(harness.tracker.requests().len(), 2);
    assert!(harness.store.actions().updates.is_empty());

    // the target appearing later re-triggers the adapter, which then rolls it
    let service = target_key(TargetKind::Service, "my-service");
    assert_eq!(
        harness.tracker.lookup(&service),
        vec![ResourceKey::of::<Adapter>(NAMESPACE, NAME)]
    );
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Service,
            NAMESPACE,
            "my-service",
            "registry.example/square@sha256:old",
        ))
        .unwrap();
    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let updates = harness.store.actions().updates;
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].data["spec"]["template"]["spec"]["containers"][0]["image"],
        json!("registry.example/square@sha256:abc")
    );
    let adapter = stored_adapter(&harness);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_TARGET_FOUND).status, ConditionStatus::True);
    assert_eq!(condition(&adapter, ADAPTER_CONDITION_READY).status, ConditionStatus::True);
}

#[tokio::test]
async fn test_ambiguous_build_reference_is_invalid() {
    let harness = Harness::new();
    let mut adapter = factories::adapter(NAMESPACE, NAME, "my-function", "my-service");
    adapter.spec.build.container_ref = Some("my-container".to_owned());
    harness.seed(&adapter).unwrap();
    let engine = harness.engine(AdapterReconciler);

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let build_ready = condition(&stored_adapter(&harness), ADAPTER_CONDITION_BUILD_READY);
    assert_eq!(build_ready.status, ConditionStatus::False);
    assert_eq!(build_ready.reason.as_deref(), Some("InvalidSpec"));
    assert!(harness.tracker.requests().is_empty());
}

#[tokio::test]
async fn test_target_update_failure_is_reported() {
    let harness = Harness::new();
    harness
        .seed_dynamic(factories::build(
            BuildKind::Function,
            NAMESPACE,
            "my-function",
            Some("registry.example/square@sha256:abc"),
            Some("True"),
        ))
        .unwrap();
    harness
        .seed_dynamic(factories::knative_target(
            TargetKind::Service,
            NAMESPACE,
            "my-service",
            "registry.example/square@sha256:old",
        ))
        .unwrap();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    harness.store.fail_on(Verb::Update, "Service", "inducing failure");
    let engine = harness.engine(AdapterReconciler);

    let err = harness
        .reconcile(&engine, NAMESPACE, NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Store(_)));

    let events = harness.recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::Warning);
    assert_eq!(events[0].reason, "UpdateFailed");
    assert!(harness.store.actions().status_updates.is_empty());
}

#[tokio::test]
async fn test_build_read_failure_propagates() {
    let harness = Harness::new();
    harness
        .seed(&factories::adapter(NAMESPACE, NAME, "my-function", "my-service"))
        .unwrap();
    harness.store.fail_on(Verb::Get, "Function", "inducing failure");
    let engine = harness.engine(AdapterReconciler);

    let err = harness
        .reconcile(&engine, NAMESPACE, NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Store(_)));
    assert_eq!(harness.tracker.requests().len(), 1);
}
