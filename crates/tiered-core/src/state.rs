//! Shared wiring of the tiers for embedding hosts and the CLI.

use std::sync::Arc;

use crate::collaborators::ToolRegistry;
use crate::config::TieredConfig;
use crate::coordinator::Coordinator;
use crate::db::Database;
use crate::events::EventBus;
use crate::executor::StepExecutor;
use crate::store::SwarmStore;

/// Tier 1 wired over tier 3, sharing one database and event bus.
pub struct AppStateInner {
    pub db: Database,
    pub config: TieredConfig,
    pub event_bus: EventBus,
    pub executor: Arc<StepExecutor>,
    pub coordinator: Arc<Coordinator>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, config: TieredConfig, tools: ToolRegistry) -> Self {
        let executor = Arc::new(StepExecutor::from_config(&config, tools));
        Self::with_executor(db, config, executor)
    }

    /// Wire the coordinator over a caller-built executor.
    pub fn with_executor(db: Database, config: TieredConfig, executor: Arc<StepExecutor>) -> Self {
        let event_bus = EventBus::new();
        let coordinator = Arc::new(Coordinator::new(
            config.coordinator.clone(),
            SwarmStore::new(db.clone()),
            event_bus.clone(),
            executor.clone(),
        ));
        Self {
            db,
            config,
            event_bus,
            executor,
            coordinator,
        }
    }
}
