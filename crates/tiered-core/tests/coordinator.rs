//! Integration tests for the coordinator over an in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use tiered_core::config::CoordinatorConfig;
use tiered_core::models::request::{RoutinePayload, SwarmPayload, TierExecutionRequest};
use tiered_core::models::result::{ExecutionResult, ExecutionStatus, Tier};
use tiered_core::models::swarm::{ResourceUsage, SwarmStatus, TeamMember};
use tiered_core::store::SwarmStore;
use tiered_core::{
    Coordinator, Database, EventBus, StartSwarmParams, StepExecutor, TierClient, TierError,
    TierStatus,
};

struct FailingTier;

#[async_trait::async_trait]
impl TierClient for FailingTier {
    async fn execute(&self, _request: TierExecutionRequest) -> Result<ExecutionResult, TierError> {
        Err(TierError::Unavailable("workflow engine rejected the routine".to_string()))
    }

    async fn get_status(&self) -> TierStatus {
        TierStatus {
            healthy: false,
            tier: Tier::Tier2,
            active_executions: 0,
        }
    }
}

fn coordinator_over(next_tier: Arc<dyn TierClient>) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(
        CoordinatorConfig::default(),
        SwarmStore::new(Database::open_in_memory().unwrap()),
        EventBus::new(),
        next_tier,
    ))
}

#[tokio::test]
async fn test_concurrent_start_creates_one_record() {
    let coordinator = coordinator_over(Arc::new(FailingTier));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let c = coordinator.clone();
            tokio::spawn(async move {
                let mut params = StartSwarmParams::new(format!("goal {}", i), "u1");
                params.swarm_id = Some("shared".to_string());
                c.start_swarm(params).await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.swarm.swarm_id, "shared");
        if outcome.created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(coordinator.list_swarms().await.unwrap().len(), 1);
    assert_eq!(
        coordinator.event_bus().recent("swarm.lifecycle.started").await.len(),
        1
    );
}

#[tokio::test]
async fn test_swarm_request_returns_in_progress() {
    let coordinator = coordinator_over(Arc::new(FailingTier));
    let request = TierExecutionRequest::swarm(
        "u1",
        SwarmPayload {
            swarm_id: Some("s-req".to_string()),
            goal: "Research competitors".to_string(),
            ..Default::default()
        },
    );

    let result = coordinator.execute(request.clone()).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::InProgress);
    assert_eq!(
        result.data,
        Some(json!({ "swarmId": "s-req", "created": true, "status": "running" }))
    );

    let again = coordinator.execute(request).await.unwrap();
    assert_eq!(again.data.unwrap()["created"], false);

    let swarm = coordinator.get_swarm("s-req").await.unwrap().unwrap();
    assert_eq!(swarm.user_id, "u1");
}

#[tokio::test]
async fn test_swarm_request_with_missing_parent_fails_at_tier1() {
    let coordinator = coordinator_over(Arc::new(FailingTier));
    let request = TierExecutionRequest::swarm(
        "u1",
        SwarmPayload {
            goal: "child work".to_string(),
            parent_swarm_id: Some("ghost".to_string()),
            ..Default::default()
        },
    );

    let result = coordinator.execute(request).await.unwrap();
    let err = result.error.unwrap();
    assert_eq!(err.tier, Tier::Tier1);
    assert_eq!(err.code, "NOT_FOUND");
}

#[tokio::test]
async fn test_failing_downstream_surfaces_original_message() {
    let coordinator = coordinator_over(Arc::new(FailingTier));
    let request = TierExecutionRequest::routine("u1", RoutinePayload::default());

    let result = coordinator.execute(request).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    let err = result.error.unwrap();
    assert_eq!(err.message, "workflow engine rejected the routine");
    assert_eq!(err.code, "DOWNSTREAM_TIER_FAILED");
    assert_eq!(err.tier, Tier::Tier2);
}

#[tokio::test]
async fn test_routine_forwards_to_step_executor() {
    let coordinator = coordinator_over(Arc::new(StepExecutor::new()));
    let request = TierExecutionRequest::routine(
        "u1",
        RoutinePayload {
            routine_id: Some("r-1".to_string()),
            inputs: json!({ "prompt": "hello" }).as_object().cloned().unwrap(),
            ..Default::default()
        },
    );
    let execution_id = request.execution_id.clone();

    let result = coordinator.execute(request).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.execution_id, execution_id);
    assert_eq!(result.metadata.tier, Some(Tier::Tier3));
    assert_eq!(result.metadata.step_id.as_deref(), Some("r-1"));
}

#[tokio::test]
async fn test_subscribers_observe_team_and_children() {
    let coordinator = coordinator_over(Arc::new(FailingTier));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    coordinator
        .event_bus()
        .subscribe("swarm.team.*", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    let mut root = StartSwarmParams::new("root goal", "u1");
    root.swarm_id = Some("root".to_string());
    coordinator.start_swarm(root).await.unwrap();

    let mut child = StartSwarmParams::new("child goal", "u1");
    child.swarm_id = Some("child".to_string());
    child.parent_swarm_id = Some("root".to_string());
    coordinator.start_swarm(child).await.unwrap();

    let swarm = coordinator
        .form_team(
            "root",
            vec![
                TeamMember { agent_id: "a1".to_string(), role: "lead".to_string() },
                TeamMember { agent_id: "a2".to_string(), role: "researcher".to_string() },
            ],
        )
        .await
        .unwrap();
    assert_eq!(swarm.team.len(), 2);

    let children = coordinator.list_children("root").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].parent_swarm_id.as_deref(), Some("root"));

    // Two formation requests plus one formed event; handlers run on spawned tasks.
    for _ in 0..50 {
        if seen.load(Ordering::SeqCst) == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_status_counts_active_swarms_after_reload() {
    let db = Database::open_in_memory().unwrap();
    let first = Coordinator::new(
        CoordinatorConfig::default(),
        SwarmStore::new(db.clone()),
        EventBus::new(),
        Arc::new(FailingTier),
    );
    for id in ["a", "b"] {
        let mut params = StartSwarmParams::new("g", "u1");
        params.swarm_id = Some(id.to_string());
        first.start_swarm(params).await.unwrap();
    }
    first.update_status("b", SwarmStatus::Cancelled).await.unwrap();
    first
        .record_usage("a", ResourceUsage { credits: 1, tokens: 2, elapsed_ms: 3 })
        .await
        .unwrap();

    let second = Coordinator::new(
        CoordinatorConfig::default(),
        SwarmStore::new(db),
        EventBus::new(),
        Arc::new(FailingTier),
    );
    assert_eq!(second.get_status().await.active_executions, 0);
    assert_eq!(second.load_active().await.unwrap(), 1);

    let status = second.get_status().await;
    assert_eq!(status.tier, Tier::Tier1);
    assert!(status.healthy);
    assert_eq!(status.active_executions, 1);
    assert_eq!(second.get_swarm("a").await.unwrap().unwrap().usage.tokens, 2);
}
