//! `tiered status`: tier health.

use tiered_core::state::AppState;
use tiered_core::TierClient;

use super::print_json;

pub async fn run(state: &AppState) -> Result<(), String> {
    let tier1 = state.coordinator.get_status().await;
    let tier3 = state.executor.get_status().await;
    let model = if state.config.llm.is_configured() {
        state.config.llm.model.as_str()
    } else {
        tiered_core::llm::PLACEHOLDER_MODEL
    };
    print_json(&serde_json::json!({
        "tiers": [tier1, tier3],
        "database": state.config.db_path,
        "model": model,
    }));
    Ok(())
}
