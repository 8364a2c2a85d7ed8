//! Tiered Core: the execution core behind a three-tier agent platform.
//!
//! - Tier 1, the `Coordinator`, owns swarm lifecycle state and forwards
//!   routine-shaped work downward.
//! - Tier 2 is an external workflow orchestrator, reached only through
//!   `TierClient`.
//! - Tier 3, the `StepExecutor`, runs one atomic step (LLM call, tool call,
//!   sandboxed code, or templated API call) and normalizes the outcome.
//!
//! External services (HTTP, credential vault, code sandbox, tools, language
//! models) are consumed through the traits in `collaborators` and `llm`.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod events;
pub mod executor;
pub mod llm;
pub mod models;
pub mod state;
pub mod store;
pub mod template;
pub mod tier;

// Convenience re-exports
pub use config::TieredConfig;
pub use coordinator::{Coordinator, StartSwarmOutcome, StartSwarmParams};
pub use db::Database;
pub use error::{TemplateError, TierError};
pub use events::EventBus;
pub use executor::StepExecutor;
pub use state::{AppState, AppStateInner};
pub use tier::{TierClient, TierStatus};
