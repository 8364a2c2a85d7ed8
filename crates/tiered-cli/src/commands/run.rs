//! `tiered run`: send a request file through the coordinator.

use std::path::Path;

use serde_json::Value;
use tiered_core::models::request::TierExecutionRequest;
use tiered_core::state::AppState;
use tiered_core::TierClient;

use super::print_json;

/// Load a request from a `.json`, `.yaml`, or `.yml` file.
///
/// A missing `executionId` is generated.
pub fn load_request(path: &str) -> Result<TierExecutionRequest, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read request file '{}': {}", path, e))?;

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let mut value: Value = if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| format!("Invalid YAML request: {}", e))?
    } else {
        serde_json::from_str(&content).map_err(|e| format!("Invalid JSON request: {}", e))?
    };

    if let Some(obj) = value.as_object_mut() {
        obj.entry("executionId")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    }

    serde_json::from_value(value).map_err(|e| format!("Invalid request: {}", e))
}

pub async fn run(state: &AppState, file: &str) -> Result<(), String> {
    let request = load_request(file)?;
    tracing::info!(
        "[cli] Running {} request {}",
        request.request_type().as_str(),
        request.execution_id
    );

    let result = state
        .coordinator
        .execute(request)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::to_value(&result).map_err(|e| e.to_string())?);

    if result.is_failed() {
        let message = result
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown error");
        return Err(format!("Execution {} failed: {}", result.execution_id, message));
    }
    Ok(())
}
