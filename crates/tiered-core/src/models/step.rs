use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::api_config::RoutineConfig;
use super::io_mapping::SubroutineIoMapping;

/// The four execution strategies of the step executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LlmCall,
    ToolCall,
    CodeExecution,
    ApiCall,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmCall => "llm_call",
            Self::ToolCall => "tool_call",
            Self::CodeExecution => "code_execution",
            Self::ApiCall => "api_call",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "llm_call" => Some(Self::LlmCall),
            "tool_call" => Some(Self::ToolCall),
            "code_execution" => Some(Self::CodeExecution),
            "api_call" => Some(Self::ApiCall),
            _ => None,
        }
    }

    /// Infer the step type from the shape of its inputs. First match wins:
    /// messages/prompt, tool/toolName, code/script, callDataApi, then llm_call.
    pub fn infer(inputs: &Map<String, Value>, routine_config: Option<&RoutineConfig>) -> Self {
        let has = |key: &str| inputs.contains_key(key);

        if has("messages") || has("prompt") {
            Self::LlmCall
        } else if has("tool") || has("toolName") {
            Self::ToolCall
        } else if has("code") || has("script") {
            Self::CodeExecution
        } else if routine_config.is_some_and(|c| c.call_data_api.is_some()) {
            Self::ApiCall
        } else {
            Self::LlmCall
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response framing for LLM steps. `None` on a step means the default framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStrategy {
    Conversational,
    Reasoning,
    Deterministic,
}

impl StepStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Reasoning => "reasoning",
            Self::Deterministic => "deterministic",
        }
    }
}

/// Step-level knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// Timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One atomic unit of work, built per invocation and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
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
    #[serde(default)]
    pub user_languages: Vec<String>,
    /// User on whose behalf credentials are resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl StepDefinition {
    /// Build a step, inferring its type from the inputs when none is given.
    pub fn new(id: impl Into<String>, step_type: Option<StepType>, inputs: Map<String, Value>) -> Self {
        let step_type = step_type.unwrap_or_else(|| StepType::infer(&inputs, None));
        Self {
            id: id.into(),
            step_type,
            strategy: None,
            inputs,
            config: None,
            routine_config: None,
            io_mapping: None,
            user_languages: Vec::new(),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMetadata {
    /// Milliseconds; zero means "not separately measured".
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Normalized outcome of every execution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StepMetadata>,
}

impl StepResult {
    pub fn success(outputs: Value) -> Self {
        Self {
            success: true,
            outputs: Some(outputs),
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: StepMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_infer_priority_prompt_beats_tool() {
        let i = inputs(json!({ "prompt": "hi", "tool": "search" }));
        assert_eq!(StepType::infer(&i, None), StepType::LlmCall);
    }

    #[test]
    fn test_infer_tool_beats_code() {
        let i = inputs(json!({ "toolName": "search", "code": "1+1" }));
        assert_eq!(StepType::infer(&i, None), StepType::ToolCall);
    }

    #[test]
    fn test_infer_script_is_code() {
        let i = inputs(json!({ "script": "return 1" }));
        assert_eq!(StepType::infer(&i, None), StepType::CodeExecution);
    }

    #[test]
    fn test_infer_api_call_from_routine_config() {
        let cfg: RoutineConfig = serde_json::from_value(json!({
            "callDataApi": { "schema": { "endpoint": "https://example.com" } }
        }))
        .unwrap();
        let i = inputs(json!({ "city": "NYC" }));
        assert_eq!(StepType::infer(&i, Some(&cfg)), StepType::ApiCall);
        assert_eq!(StepType::infer(&i, Some(&RoutineConfig::default())), StepType::LlmCall);
    }

    #[test]
    fn test_infer_defaults_to_llm_call() {
        assert_eq!(StepType::infer(&Map::new(), None), StepType::LlmCall);
    }

    #[test]
    fn test_step_type_round_trips_wire_name() {
        for t in [StepType::LlmCall, StepType::ToolCall, StepType::CodeExecution, StepType::ApiCall] {
            assert_eq!(StepType::from_str(t.as_str()), Some(t));
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }
}
