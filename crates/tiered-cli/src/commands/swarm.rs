//! `tiered swarm`: swarm lifecycle commands.

use tiered_core::models::swarm::SwarmStatus;
use tiered_core::state::AppState;
use tiered_core::StartSwarmParams;

use super::print_json;

pub async fn start(
    state: &AppState,
    goal: &str,
    name: Option<String>,
    swarm_id: Option<String>,
    parent_swarm_id: Option<String>,
    user_id: &str,
) -> Result<(), String> {
    let params = StartSwarmParams {
        swarm_id,
        name,
        parent_swarm_id,
        ..StartSwarmParams::new(goal, user_id)
    };
    let outcome = state
        .coordinator
        .start_swarm(params)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "created": outcome.created,
        "swarm": outcome.swarm,
    }));
    Ok(())
}

pub async fn get(state: &AppState, swarm_id: &str) -> Result<(), String> {
    let swarm = state
        .coordinator
        .get_swarm(swarm_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Swarm not found: {}", swarm_id))?;
    let children = state
        .coordinator
        .list_children(swarm_id)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "swarm": swarm,
        "children": children.iter().map(|c| c.swarm_id.as_str()).collect::<Vec<_>>(),
    }));
    Ok(())
}

pub async fn list(state: &AppState) -> Result<(), String> {
    let swarms = state
        .coordinator
        .list_swarms()
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "swarms": swarms }));
    Ok(())
}

pub async fn update_status(state: &AppState, swarm_id: &str, status: &str) -> Result<(), String> {
    let status = SwarmStatus::from_str(status).ok_or_else(|| {
        format!(
            "Invalid status '{}'. Expected one of: pending, running, paused, completed, failed, cancelled",
            status
        )
    })?;
    let swarm = state
        .coordinator
        .update_status(swarm_id, status)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "swarm": swarm }));
    Ok(())
}
