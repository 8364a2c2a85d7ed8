use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TierError;

use super::step::StepType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    InProgress,
}

/// A layer of the execution hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }
}

/// Failure attribution: enough to blame a layer without leaking internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    pub tier: Tier,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ExecutionError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        tier: Tier,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            tier,
            error_type: error_type.into(),
        }
    }

    pub fn from_tier_error(err: &TierError, tier: Tier) -> Self {
        Self::new(err.code(), err.to_string(), tier, err.kind())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// Milliseconds. Stamped by the outermost caller.
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl ExecutionMetadata {
    pub fn for_tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    pub fn completed(execution_id: impl Into<String>, data: Value, metadata: ExecutionMetadata) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Completed,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn in_progress(execution_id: impl Into<String>, data: Value, metadata: ExecutionMetadata) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::InProgress,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn failed(
        execution_id: impl Into<String>,
        error: ExecutionError,
        metadata: ExecutionMetadata,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Failed,
            data: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_result_wire_shape() {
        let err = TierError::Collaborator("sandbox crashed".to_string());
        let result = ExecutionResult::failed(
            "exec-1",
            ExecutionError::from_tier_error(&err, Tier::Tier3),
            ExecutionMetadata::for_tier(Tier::Tier3),
        );
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["status"], "failed");
        assert_eq!(
            wire["error"],
            json!({
                "code": "COLLABORATOR_FAILED",
                "message": "sandbox crashed",
                "tier": "tier3",
                "type": "collaborator"
            })
        );
        assert_eq!(wire["metadata"]["executionTime"], 0);
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_in_progress_status_name() {
        let result = ExecutionResult::in_progress("e", json!({}), ExecutionMetadata::default());
        assert_eq!(serde_json::to_value(&result).unwrap()["status"], "in_progress");
    }
}
