//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses the
//! tiered-core tiers through `AppState`.

pub mod run;
pub mod status;
pub mod swarm;
pub mod template;

use std::sync::Arc;

use tiered_core::collaborators::{ToolRegistry, ToolResult};
use tiered_core::state::{AppState, AppStateInner};
use tiered_core::TieredConfig;

/// Initialize a shared `AppState` from the given SQLite database path.
pub async fn init_state(db_path: &str) -> AppState {
    let db = tiered_core::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });

    let mut config = TieredConfig::from_env();
    config.db_path = db_path.to_string();

    let state: AppState = Arc::new(AppStateInner::new(db, config, builtin_tools()));

    // Swarms left running by earlier invocations still count as active.
    if let Err(e) = state.coordinator.load_active().await {
        eprintln!("Failed to load active swarms: {}", e);
        std::process::exit(1);
    }

    state
}

/// Tools available to `tool_call` steps run from the CLI.
pub fn builtin_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register("echo", |args| async move { ToolResult::success(args) });
    tools
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
