//! The request envelope shared by every tier.
//!
//! On the wire a request is `{ executionId, type, userId, payload }`. In Rust
//! the `type`/`payload` pair is a single enum so a routine payload can never be
//! paired with `type: "swarm"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::api_config::RoutineConfig;
use super::io_mapping::SubroutineIoMapping;
use super::step::{StepConfig, StepStrategy, StepType};
use super::swarm::{SwarmConfigOverrides, SwarmResourceOverrides};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Routine,
    Swarm,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Swarm => "swarm",
        }
    }
}

/// A single routine step to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutinePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StepStrategy>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<StepConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_config: Option<RoutineConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_mapping: Option<SubroutineIoMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_languages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmRequestConfig {
    #[serde(default)]
    pub resources: SwarmResourceOverrides,
    #[serde(default)]
    pub config: SwarmConfigOverrides,
}

/// A swarm goal to coordinate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
    #[serde(default)]
    pub config: SwarmRequestConfig,
}

#[derive(Debug, Clone)]
pub enum RequestPayload {
    Routine(RoutinePayload),
    Swarm(SwarmPayload),
}

/// Immutable request routed between tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRequest", into = "RawRequest")]
pub struct TierExecutionRequest {
    pub execution_id: String,
    pub user_id: String,
    pub payload: RequestPayload,
}

impl TierExecutionRequest {
    pub fn routine(user_id: impl Into<String>, payload: RoutinePayload) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            payload: RequestPayload::Routine(payload),
        }
    }

    pub fn swarm(user_id: impl Into<String>, payload: SwarmPayload) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            payload: RequestPayload::Swarm(payload),
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self.payload {
            RequestPayload::Routine(_) => RequestType::Routine,
            RequestPayload::Swarm(_) => RequestType::Swarm,
        }
    }
}

/// Wire form of `TierExecutionRequest`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    execution_id: String,
    #[serde(rename = "type")]
    request_type: RequestType,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<RawRequest> for TierExecutionRequest {
    type Error = serde_json::Error;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let payload = if raw.payload.is_null() {
            Value::Object(Map::new())
        } else {
            raw.payload
        };
        let payload = match raw.request_type {
            RequestType::Routine => RequestPayload::Routine(serde_json::from_value(payload)?),
            RequestType::Swarm => RequestPayload::Swarm(serde_json::from_value(payload)?),
        };
        Ok(Self {
            execution_id: raw.execution_id,
            user_id: raw.user_id,
            payload,
        })
    }
}

impl From<TierExecutionRequest> for RawRequest {
    fn from(req: TierExecutionRequest) -> Self {
        let (request_type, payload) = match req.payload {
            RequestPayload::Routine(p) => (
                RequestType::Routine,
                serde_json::to_value(p).unwrap_or_default(),
            ),
            RequestPayload::Swarm(p) => (
                RequestType::Swarm,
                serde_json::to_value(p).unwrap_or_default(),
            ),
        };
        Self {
            execution_id: req.execution_id,
            request_type,
            user_id: req.user_id,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_routine_request() {
        let req: TierExecutionRequest = serde_json::from_value(json!({
            "executionId": "exec-1",
            "type": "routine",
            "userId": "user-1",
            "payload": {
                "routineId": "r-1",
                "stepType": "tool_call",
                "inputs": { "tool": "search" }
            }
        }))
        .unwrap();

        assert_eq!(req.request_type(), RequestType::Routine);
        match req.payload {
            RequestPayload::Routine(p) => {
                assert_eq!(p.routine_id.as_deref(), Some("r-1"));
                assert_eq!(p.step_type, Some(StepType::ToolCall));
                assert_eq!(p.inputs["tool"], "search");
            }
            RequestPayload::Swarm(_) => panic!("expected routine payload"),
        }
    }

    #[test]
    fn test_parse_swarm_request_with_overrides() {
        let req: TierExecutionRequest = serde_json::from_value(json!({
            "executionId": "exec-2",
            "type": "swarm",
            "userId": "user-1",
            "payload": {
                "goal": "Summarize the quarterly reports",
                "config": { "resources": { "maxTokens": 5000 } }
            }
        }))
        .unwrap();

        match &req.payload {
            RequestPayload::Swarm(p) => {
                assert_eq!(p.goal, "Summarize the quarterly reports");
                assert_eq!(p.config.resources.max_tokens, Some(5000));
                assert!(p.config.config.model.is_none());
            }
            RequestPayload::Routine(_) => panic!("expected swarm payload"),
        }

        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["type"], "swarm");
        assert_eq!(wire["executionId"], "exec-2");
        assert_eq!(wire["payload"]["goal"], "Summarize the quarterly reports");
    }

    #[test]
    fn test_swarm_request_without_goal_is_rejected() {
        let err = serde_json::from_value::<TierExecutionRequest>(json!({
            "executionId": "exec-3",
            "type": "swarm",
            "userId": "user-1",
            "payload": {}
        }));
        assert!(err.is_err());
    }
}
