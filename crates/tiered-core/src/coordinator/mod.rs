//! Coordinator (tier 1) - swarm lifecycle bookkeeping.
//!
//! The coordinator owns swarm records and nothing strategic:
//!   1. Creates or reuses a swarm record per `swarmId`
//!   2. Tracks usage against the swarm's resource limits
//!   3. Records team membership and lifecycle status
//!   4. Publishes `swarm.<category>.<event>` topics for observers
//!
//! Routine-shaped requests are forwarded verbatim to the next tier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::config::CoordinatorConfig;
use crate::error::TierError;
use crate::events::{swarm_topic, BusEvent, EventBus, EventCategory};
use crate::models::request::{RequestPayload, SwarmPayload, TierExecutionRequest};
use crate::models::result::{ExecutionError, ExecutionMetadata, ExecutionResult, Tier};
use crate::models::swarm::{
    ResourceUsage, Swarm, SwarmConfigOverrides, SwarmResourceOverrides, SwarmStatus, TeamMember,
};
use crate::store::SwarmStore;
use crate::tier::{TierClient, TierStatus};

const DOWNSTREAM_TIER_FAILED: &str = "DOWNSTREAM_TIER_FAILED";

/// Parameters for `Coordinator::start_swarm`.
#[derive(Debug, Clone, Default)]
pub struct StartSwarmParams {
    /// Generated when absent.
    pub swarm_id: Option<String>,
    pub name: Option<String>,
    pub goal: String,
    pub user_id: String,
    pub parent_swarm_id: Option<String>,
    pub resources: SwarmResourceOverrides,
    pub config: SwarmConfigOverrides,
}

impl StartSwarmParams {
    pub fn new(goal: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn from_payload(payload: &SwarmPayload, user_id: &str) -> Self {
        Self {
            swarm_id: payload.swarm_id.clone(),
            name: payload.name.clone(),
            goal: payload.goal.clone(),
            user_id: user_id.to_string(),
            parent_swarm_id: payload.parent_swarm_id.clone(),
            resources: payload.config.resources.clone(),
            config: payload.config.config.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartSwarmOutcome {
    pub swarm: Swarm,
    /// `false` when an existing record was reused.
    pub created: bool,
}

struct CoordinatorInner {
    /// Swarms that are not in a terminal status.
    active: HashSet<String>,
}

pub struct Coordinator {
    inner: Arc<RwLock<CoordinatorInner>>,
    /// Per-swarm locks serializing creation and read-modify-write updates.
    swarm_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    config: CoordinatorConfig,
    store: SwarmStore,
    event_bus: EventBus,
    next_tier: Arc<dyn TierClient>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: SwarmStore,
        event_bus: EventBus,
        next_tier: Arc<dyn TierClient>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CoordinatorInner {
                active: HashSet::new(),
            })),
            swarm_locks: Mutex::new(HashMap::new()),
            config,
            store,
            event_bus,
            next_tier,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Rebuild the active set from persisted non-terminal swarms.
    pub async fn load_active(&self) -> Result<usize, TierError> {
        let swarms = self.store.list().await?;
        let mut inner = self.inner.write().await;
        inner.active = swarms
            .into_iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.swarm_id)
            .collect();
        Ok(inner.active.len())
    }

    // ─── Keyed locks ────────────────────────────────────────────────────

    async fn lock_for(&self, swarm_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.swarm_locks.lock().await;
        locks
            .entry(swarm_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no other caller holds a reference to it.
    async fn release_lock(&self, swarm_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.swarm_locks.lock().await;
        // One reference in the table, one held here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(swarm_id);
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Create the swarm, or reuse the existing record with the same id.
    pub async fn start_swarm(&self, params: StartSwarmParams) -> Result<StartSwarmOutcome, TierError> {
        if params.goal.trim().is_empty() {
            return Err(TierError::BadRequest("Swarm goal is required".to_string()));
        }
        let swarm_id = params
            .swarm_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if params.parent_swarm_id.as_deref() == Some(swarm_id.as_str()) {
            return Err(TierError::BadRequest(format!(
                "Swarm {} cannot be its own parent",
                swarm_id
            )));
        }

        let lock = self.lock_for(&swarm_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.start_swarm_locked(swarm_id.clone(), params).await
        };
        self.release_lock(&swarm_id, lock).await;
        outcome
    }

    async fn start_swarm_locked(
        &self,
        swarm_id: String,
        params: StartSwarmParams,
    ) -> Result<StartSwarmOutcome, TierError> {
        if let Some(existing) = self.store.get(&swarm_id).await? {
            tracing::info!("[Coordinator] Reusing existing swarm {}", swarm_id);
            return Ok(StartSwarmOutcome {
                swarm: existing,
                created: false,
            });
        }

        if let Some(parent_id) = &params.parent_swarm_id {
            if self.store.get(parent_id).await?.is_none() {
                return Err(TierError::NotFound(format!("Parent swarm {}", parent_id)));
            }
        }

        let name = params
            .name
            .clone()
            .unwrap_or_else(|| format!("Swarm {}", swarm_id.chars().take(8).collect::<String>()));
        let mut swarm = Swarm::new(
            swarm_id.clone(),
            name,
            params.goal.clone(),
            params.resources.apply(&self.config.default_resources),
            params.config.apply(&self.config.default_swarm_config),
            params.user_id.clone(),
            params.parent_swarm_id.clone(),
        );
        swarm.status = SwarmStatus::Running;

        if !self.store.create_if_absent(&swarm).await? {
            // Another process created it between the read and the insert.
            let existing = self
                .store
                .get(&swarm_id)
                .await?
                .ok_or_else(|| TierError::Internal(format!("Swarm {} vanished after insert", swarm_id)))?;
            return Ok(StartSwarmOutcome {
                swarm: existing,
                created: false,
            });
        }

        self.inner.write().await.active.insert(swarm_id.clone());

        tracing::info!(
            "[Coordinator] Started swarm {} for user {} (parent: {})",
            swarm_id,
            swarm.user_id,
            swarm.parent_swarm_id.as_deref().unwrap_or("none")
        );

        self.publish(
            EventCategory::Lifecycle,
            "started",
            json!({
                "swarmId": swarm.swarm_id,
                "name": swarm.name,
                "goal": swarm.goal,
                "userId": swarm.user_id,
                "parentSwarmId": swarm.parent_swarm_id,
            }),
        )
        .await;
        self.publish(
            EventCategory::Resource,
            "allocated",
            json!({ "swarmId": swarm.swarm_id, "resources": swarm.resources }),
        )
        .await;
        self.publish(
            EventCategory::Team,
            "formation_requested",
            json!({ "swarmId": swarm.swarm_id, "goal": swarm.goal, "config": swarm.config }),
        )
        .await;

        Ok(StartSwarmOutcome {
            swarm,
            created: true,
        })
    }

    /// Persist a lifecycle status and publish `swarm.lifecycle.<status>`.
    pub async fn update_status(&self, swarm_id: &str, status: SwarmStatus) -> Result<Swarm, TierError> {
        if !self.store.update_status(swarm_id, status).await? {
            return Err(TierError::NotFound(format!("Swarm {}", swarm_id)));
        }

        {
            let mut inner = self.inner.write().await;
            if status.is_terminal() {
                inner.active.remove(swarm_id);
            } else {
                inner.active.insert(swarm_id.to_string());
            }
        }

        tracing::info!("[Coordinator] Swarm {} is now {}", swarm_id, status.as_str());
        self.publish(
            EventCategory::Lifecycle,
            status.as_str(),
            json!({ "swarmId": swarm_id, "status": status.as_str() }),
        )
        .await;

        self.require_swarm(swarm_id).await
    }

    // ─── Resources ──────────────────────────────────────────────────────

    /// Add `delta` to the swarm's usage. Limits are reported, not enforced.
    pub async fn record_usage(&self, swarm_id: &str, delta: ResourceUsage) -> Result<Swarm, TierError> {
        let lock = self.lock_for(swarm_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.record_usage_locked(swarm_id, delta).await
        };
        self.release_lock(swarm_id, lock).await;
        outcome
    }

    async fn record_usage_locked(&self, swarm_id: &str, delta: ResourceUsage) -> Result<Swarm, TierError> {
        let mut swarm = self.require_swarm(swarm_id).await?;
        let already_exceeded = swarm.usage.exceeded(&swarm.resources);

        swarm.usage.add(&delta);
        self.store.update_usage(swarm_id, &swarm.usage).await?;

        self.publish(
            EventCategory::Resource,
            "usage_recorded",
            json!({ "swarmId": swarm_id, "delta": delta, "usage": swarm.usage }),
        )
        .await;

        let newly_exceeded: Vec<&str> = swarm
            .usage
            .exceeded(&swarm.resources)
            .into_iter()
            .filter(|limit| !already_exceeded.contains(limit))
            .collect();
        if !newly_exceeded.is_empty() {
            tracing::warn!(
                "[Coordinator] Swarm {} exceeded {}",
                swarm_id,
                newly_exceeded.join(", ")
            );
            self.publish(
                EventCategory::Resource,
                "limit_exceeded",
                json!({
                    "swarmId": swarm_id,
                    "limits": newly_exceeded,
                    "usage": swarm.usage,
                    "resources": swarm.resources,
                }),
            )
            .await;
        }

        Ok(swarm)
    }

    // ─── Team ───────────────────────────────────────────────────────────

    /// Persist team membership and publish `swarm.team.formed`.
    pub async fn form_team(&self, swarm_id: &str, members: Vec<TeamMember>) -> Result<Swarm, TierError> {
        if !self.store.update_team(swarm_id, &members).await? {
            return Err(TierError::NotFound(format!("Swarm {}", swarm_id)));
        }
        tracing::info!("[Coordinator] Swarm {} formed a team of {}", swarm_id, members.len());
        self.publish(
            EventCategory::Team,
            "formed",
            json!({ "swarmId": swarm_id, "team": members }),
        )
        .await;
        self.require_swarm(swarm_id).await
    }

    // ─── Signals ────────────────────────────────────────────────────────

    /// Publish `swarm.metacognition.<signal>` for observer agents.
    pub async fn emit_signal(&self, swarm_id: &str, signal: &str, data: Value) -> Result<BusEvent, TierError> {
        if signal.is_empty() || signal.contains('.') || signal == "*" || signal == "#" {
            return Err(TierError::BadRequest(format!("Invalid signal name: '{}'", signal)));
        }
        self.require_swarm(swarm_id).await?;
        Ok(self
            .publish(
                EventCategory::Metacognition,
                signal,
                json!({ "swarmId": swarm_id, "data": data }),
            )
            .await)
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub async fn get_swarm(&self, swarm_id: &str) -> Result<Option<Swarm>, TierError> {
        self.store.get(swarm_id).await
    }

    pub async fn list_swarms(&self) -> Result<Vec<Swarm>, TierError> {
        self.store.list().await
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Swarm>, TierError> {
        self.store.list_children(parent_id).await
    }

    pub async fn active_swarm_count(&self) -> usize {
        self.inner.read().await.active.len()
    }

    async fn require_swarm(&self, swarm_id: &str) -> Result<Swarm, TierError> {
        self.store
            .get(swarm_id)
            .await?
            .ok_or_else(|| TierError::NotFound(format!("Swarm {}", swarm_id)))
    }

    async fn publish(&self, category: EventCategory, event: &str, data: Value) -> BusEvent {
        self.event_bus.publish(&swarm_topic(category, event), data).await
    }

    // ─── Request handling ───────────────────────────────────────────────

    async fn forward(&self, request: TierExecutionRequest, start: Instant) -> ExecutionResult {
        let execution_id = request.execution_id.clone();
        match self.next_tier.execute(request).await {
            Ok(mut result) => {
                result.metadata.execution_time = start.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                tracing::error!(
                    "[Coordinator] Downstream tier failed for {}: {}",
                    execution_id,
                    e
                );
                let mut metadata = ExecutionMetadata::for_tier(Tier::Tier1);
                metadata.execution_time = start.elapsed().as_millis() as u64;
                ExecutionResult::failed(
                    execution_id,
                    ExecutionError::new(DOWNSTREAM_TIER_FAILED, e.to_string(), Tier::Tier2, e.kind()),
                    metadata,
                )
            }
        }
    }

    async fn handle_swarm(
        &self,
        execution_id: String,
        user_id: &str,
        payload: &SwarmPayload,
        start: Instant,
    ) -> ExecutionResult {
        let outcome = self
            .start_swarm(StartSwarmParams::from_payload(payload, user_id))
            .await;

        let mut metadata = ExecutionMetadata::for_tier(Tier::Tier1);
        metadata.execution_time = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(StartSwarmOutcome { swarm, created }) => ExecutionResult::in_progress(
                execution_id,
                json!({
                    "swarmId": swarm.swarm_id,
                    "created": created,
                    "status": swarm.status.as_str(),
                }),
                metadata,
            ),
            Err(e) => {
                tracing::error!("[Coordinator] Failed to start swarm for {}: {}", execution_id, e);
                ExecutionResult::failed(
                    execution_id,
                    ExecutionError::from_tier_error(&e, Tier::Tier1),
                    metadata,
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl TierClient for Coordinator {
    async fn execute(&self, request: TierExecutionRequest) -> Result<ExecutionResult, TierError> {
        let start = Instant::now();
        let result = if let RequestPayload::Swarm(payload) = &request.payload {
            self.handle_swarm(request.execution_id.clone(), &request.user_id, payload, start)
                .await
        } else {
            self.forward(request, start).await
        };
        Ok(result)
    }

    async fn get_status(&self) -> TierStatus {
        TierStatus {
            healthy: true,
            tier: Tier::Tier1,
            active_executions: self.active_swarm_count().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    struct Unreachable;

    #[async_trait::async_trait]
    impl TierClient for Unreachable {
        async fn execute(&self, _request: TierExecutionRequest) -> Result<ExecutionResult, TierError> {
            Err(TierError::Unavailable("tier2 offline".to_string()))
        }

        async fn get_status(&self) -> TierStatus {
            TierStatus {
                healthy: false,
                tier: Tier::Tier2,
                active_executions: 0,
            }
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(
            CoordinatorConfig::default(),
            SwarmStore::new(Database::open_in_memory().unwrap()),
            EventBus::new(),
            Arc::new(Unreachable),
        )
    }

    #[tokio::test]
    async fn test_start_swarm_merges_overrides_and_runs() {
        let c = coordinator();
        let mut params = StartSwarmParams::new("Write the report", "u1");
        params.resources.max_tokens = Some(5);
        let outcome = c.start_swarm(params).await.unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.swarm.status, SwarmStatus::Running);
        assert_eq!(outcome.swarm.resources.max_tokens, 5);
        assert_eq!(
            outcome.swarm.resources.max_credits,
            CoordinatorConfig::default().default_resources.max_credits
        );
        assert_eq!(c.active_swarm_count().await, 1);

        let topics: Vec<String> = c
            .event_bus()
            .recent("swarm.#")
            .await
            .into_iter()
            .map(|e| e.topic)
            .collect();
        assert_eq!(
            topics,
            vec![
                "swarm.lifecycle.started",
                "swarm.resource.allocated",
                "swarm.team.formation_requested"
            ]
        );
    }

    #[tokio::test]
    async fn test_parent_must_exist_and_differ() {
        let c = coordinator();
        let mut params = StartSwarmParams::new("g", "u1");
        params.parent_swarm_id = Some("ghost".to_string());
        assert!(matches!(c.start_swarm(params).await, Err(TierError::NotFound(_))));

        let mut params = StartSwarmParams::new("g", "u1");
        params.swarm_id = Some("s1".to_string());
        params.parent_swarm_id = Some("s1".to_string());
        assert!(matches!(c.start_swarm(params).await, Err(TierError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_record_usage_reports_limit_once() {
        let c = coordinator();
        let mut params = StartSwarmParams::new("g", "u1");
        params.swarm_id = Some("s1".to_string());
        params.resources.max_tokens = Some(100);
        c.start_swarm(params).await.unwrap();

        let delta = ResourceUsage { credits: 0, tokens: 80, elapsed_ms: 0 };
        c.record_usage("s1", delta.clone()).await.unwrap();
        let swarm = c.record_usage("s1", delta.clone()).await.unwrap();
        c.record_usage("s1", delta).await.unwrap();

        assert_eq!(swarm.usage.tokens, 160);
        assert_eq!(c.event_bus().recent("swarm.resource.usage_recorded").await.len(), 3);
        let exceeded = c.event_bus().recent("swarm.resource.limit_exceeded").await;
        assert_eq!(exceeded.len(), 1);
        assert_eq!(exceeded[0].data["limits"], json!(["maxTokens"]));
    }

    #[tokio::test]
    async fn test_terminal_status_leaves_active_set() {
        let c = coordinator();
        let mut params = StartSwarmParams::new("g", "u1");
        params.swarm_id = Some("s1".to_string());
        c.start_swarm(params).await.unwrap();

        let swarm = c.update_status("s1", SwarmStatus::Completed).await.unwrap();
        assert_eq!(swarm.status, SwarmStatus::Completed);
        assert_eq!(c.get_status().await.active_executions, 0);
        assert_eq!(c.event_bus().recent("swarm.lifecycle.completed").await.len(), 1);
        assert!(matches!(
            c.update_status("nope", SwarmStatus::Paused).await,
            Err(TierError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_signal_names_are_single_segments() {
        let c = coordinator();
        let mut params = StartSwarmParams::new("g", "u1");
        params.swarm_id = Some("s1".to_string());
        c.start_swarm(params).await.unwrap();

        let event = c.emit_signal("s1", "stalled", json!({ "reason": "no progress" })).await.unwrap();
        assert_eq!(event.topic, "swarm.metacognition.stalled");
        assert!(c.emit_signal("s1", "a.b", Value::Null).await.is_err());
        assert!(c.emit_signal("ghost", "stalled", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_routine_request_surfaces_downstream_error() {
        use crate::models::request::RoutinePayload;

        let c = coordinator();
        let result = c
            .execute(TierExecutionRequest::routine("u1", RoutinePayload::default()))
            .await
            .unwrap();
        let err = result.error.unwrap();
        assert_eq!(err.code, "DOWNSTREAM_TIER_FAILED");
        assert_eq!(err.message, "tier2 offline");
        assert_eq!(err.tier, Tier::Tier2);
        assert_eq!(err.error_type, "unavailable");
    }
}
