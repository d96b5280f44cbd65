//! Engine behavior independent of any kind-specific logic, driven through a
//! stub reconciler on KafkaProvider.

use async_trait::async_trait;
use riff_system_controller::config::ControllerConfig;
use riff_system_controller::controller::{Context, Engine, Outcome, Parent, ParentReconciler, ReconcilerError};
use riff_system_controller::crd::{
    ConditionStatus, KafkaProvider, KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY, KAFKA_PROVIDER_CONDITION_READY,
};
use riff_system_controller::store::IndexRegistry;
use riff_system_controller::testing::{factories, Harness};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "default";
const NAME: &str = "franz";

/// Marks one leaf condition and returns a fixed outcome, optionally after a delay
struct Stub {
    outcome: Outcome,
    delay: Option<Duration>,
}

impl Stub {
    fn returning(outcome: Outcome) -> Self {
        Self { outcome, delay: None }
    }
}

#[async_trait]
impl ParentReconciler for Stub {
    type Resource = KafkaProvider;

    fn register_indexes(&self, _indexes: &IndexRegistry) {}

    async fn reconcile(&self, _ctx: &Context, provider: &mut KafkaProvider) -> Result<Outcome, ReconcilerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        provider
            .conditions()
            .mark_true(KAFKA_PROVIDER_CONDITION_GATEWAY_SERVICE_READY);
        Ok(self.outcome)
    }
}

fn seeded(harness: &Harness) -> KafkaProvider {
    let mut provider = factories::kafka_provider(NAMESPACE, NAME, "kafka:9092");
    provider.metadata.generation = Some(4);
    harness.seed(&provider).unwrap()
}

#[tokio::test]
async fn test_commit_records_observed_generation_and_aggregate() {
    let harness = Harness::new();
    seeded(&harness);
    let engine = harness.engine(Stub::returning(Outcome::Done));

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    let provider: KafkaProvider = harness.get(NAMESPACE, NAME).unwrap();
    let status = provider.status.unwrap();
    assert_eq!(status.observed_generation, Some(4));
    let ready = status
        .conditions
        .iter()
        .find(|c| c.r#type == KAFKA_PROVIDER_CONDITION_READY)
        .unwrap();
    assert_eq!(ready.status, ConditionStatus::Unknown);
    assert_eq!(status.conditions.len(), 5);
}

#[tokio::test]
async fn test_requeue_skips_status_commit() {
    let harness = Harness::new();
    seeded(&harness);
    let engine = harness.engine(Stub::returning(Outcome::Requeue));

    let outcome = harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, Outcome::Requeue);
    assert!(harness.store.actions().status_updates.is_empty());
}

#[tokio::test]
async fn test_requeue_after_still_commits() {
    let harness = Harness::new();
    seeded(&harness);
    let engine = harness.engine(Stub::returning(Outcome::RequeueAfter(Duration::from_secs(5))));

    let outcome = harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, Outcome::RequeueAfter(Duration::from_secs(5)));
    assert_eq!(harness.store.actions().status_updates.len(), 1);
}

#[tokio::test]
async fn test_cancelled_pass_never_commits() {
    let harness = Harness::new();
    seeded(&harness);
    let engine = Engine::new(harness.context().clone(), Stub::returning(Outcome::Done));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.reconcile(NAMESPACE, NAME, &cancel).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Cancelled));
    assert!(harness.store.actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_pass_hits_deadline() {
    let config = ControllerConfig {
        reconcile_timeout: Duration::from_secs(10),
        ..ControllerConfig::default()
    };
    let harness = Harness::with_config(config);
    seeded(&harness);
    let engine = harness.engine(Stub {
        outcome: Outcome::Done,
        delay: Some(Duration::from_secs(60)),
    });

    let err = harness
        .reconcile(&engine, NAMESPACE, NAME)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::DeadlineExceeded(d) if d == Duration::from_secs(10)));
    assert!(harness.store.actions().status_updates.is_empty());
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let harness = Harness::new();
    seeded(&harness);
    let engine = harness.engine(Stub::returning(Outcome::Done));
    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();
    harness.store.clear_actions();

    harness.reconcile(&engine, NAMESPACE, NAME).await.unwrap();

    assert!(harness.store.actions().is_empty());
}
