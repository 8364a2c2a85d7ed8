//! Step Executor (tier 3): runs one atomic step and normalizes the outcome.
//!
//! The executor is stateless across calls. Each step is dispatched on its
//! `StepType` to one of four strategies:
//! 1. `llm_call`: normalize a message history and call the language model
//! 2. `tool_call`: look up a named tool and pass its result through
//! 3. `code_execution`: run user code in the sandbox
//! 4. `api_call`: template an HTTP request from `routineConfig.callDataApi`
//!
//! Collaborators are constructor-injected; `with_*` swaps one out.

mod api_call;

pub use api_call::{build_request_options, resolve_path};

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::collaborators::{
    CodeSandbox, CredentialResolver, EnvCredentialResolver, HttpClient, ProcessSandbox,
    ReqwestHttpClient, SandboxOutcome, SandboxRequest, ToolInvoker, ToolRegistry,
};
use crate::config::TieredConfig;
use crate::error::TierError;
use crate::llm::{
    ChatMessage, LanguageModelInvoker, LlmRequest, MessagesApiInvoker, PlaceholderLanguageModel,
};
use crate::models::request::{RequestPayload, TierExecutionRequest};
use crate::models::result::{ExecutionError, ExecutionMetadata, ExecutionResult, Tier};
use crate::models::step::{StepDefinition, StepMetadata, StepResult, StepType};
use crate::tier::{TierClient, TierStatus};

/// Input keys that configure an LLM call rather than describe its content.
const LLM_RESERVED_KEYS: &[&str] = &[
    "messages",
    "prompt",
    "message",
    "systemPrompt",
    "model",
    "temperature",
    "maxTokens",
];

const CODE_KEYS: &[&str] = &["code", "codeLanguage", "language"];

const STEP_FAILED: &str = "STEP_FAILED";
const INVALID_REQUEST: &str = "INVALID_REQUEST";

pub struct StepExecutor {
    credentials: Arc<dyn CredentialResolver>,
    http: Arc<dyn HttpClient>,
    sandbox: Arc<dyn CodeSandbox>,
    tools: Arc<dyn ToolInvoker>,
    llm: Arc<dyn LanguageModelInvoker>,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor {
    /// Executor over the default collaborators with the placeholder model.
    pub fn new() -> Self {
        Self {
            credentials: Arc::new(EnvCredentialResolver::default()),
            http: Arc::new(ReqwestHttpClient::default()),
            sandbox: Arc::new(ProcessSandbox::default()),
            tools: Arc::new(ToolRegistry::default()),
            llm: Arc::new(PlaceholderLanguageModel),
        }
    }

    /// Executor wired from configuration. The Messages API invoker is used
    /// only when an API key is configured.
    pub fn from_config(config: &TieredConfig, tools: ToolRegistry) -> Self {
        let llm: Arc<dyn LanguageModelInvoker> = if config.llm.is_configured() {
            tracing::info!("[StepExecutor] Using Messages API model {}", config.llm.model);
            Arc::new(MessagesApiInvoker::new(config.llm.clone()))
        } else {
            Arc::new(PlaceholderLanguageModel)
        };

        Self {
            credentials: Arc::new(EnvCredentialResolver::new(config.credential_env_prefix.clone())),
            http: Arc::new(ReqwestHttpClient::new(config.http.clone())),
            sandbox: Arc::new(ProcessSandbox::new(config.sandbox.clone())),
            tools: Arc::new(tools),
            llm,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LanguageModelInvoker>) -> Self {
        self.llm = llm;
        self
    }

    /// Execute one step. Never fails: errors become `success: false`.
    ///
    /// API-call steps write mapped outputs back into `step.io_mapping`.
    pub async fn execute_step(&self, step: &mut StepDefinition) -> StepResult {
        let start = Instant::now();
        let step_type = step.step_type;

        let outcome = match step_type {
            StepType::LlmCall => self.execute_llm_call(step).await,
            StepType::ToolCall => self.execute_tool_call(step).await,
            StepType::CodeExecution => self.execute_code(step).await,
            StepType::ApiCall => self.execute_api_call(step).await,
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    "[StepExecutor] Step {} ({}) failed: {}",
                    step.id,
                    step_type,
                    e
                );
                StepResult::failure(e.to_string()).with_metadata(StepMetadata {
                    execution_time: start.elapsed().as_millis() as u64,
                    error_code: Some(e.code().to_string()),
                    ..Default::default()
                })
            }
        }
    }

    /// Adapt a routine request into a step definition.
    ///
    /// The step id is `stepId`, then `routineId`, then the execution id.
    pub fn step_from_request(request: &TierExecutionRequest) -> Result<StepDefinition, TierError> {
        let payload = match &request.payload {
            RequestPayload::Routine(p) => p,
            RequestPayload::Swarm(_) => {
                return Err(TierError::BadRequest(
                    "Step executor only handles routine requests".to_string(),
                ))
            }
        };

        let id = payload
            .step_id
            .clone()
            .or_else(|| payload.routine_id.clone())
            .unwrap_or_else(|| request.execution_id.clone());
        let step_type = payload
            .step_type
            .unwrap_or_else(|| StepType::infer(&payload.inputs, payload.routine_config.as_ref()));

        Ok(StepDefinition {
            id,
            step_type,
            strategy: payload.strategy,
            inputs: payload.inputs.clone(),
            config: payload.config.clone(),
            routine_config: payload.routine_config.clone(),
            io_mapping: payload.io_mapping.clone(),
            user_languages: payload.user_languages.clone(),
            user_id: Some(request.user_id.clone()).filter(|u| !u.is_empty()),
        })
    }

    // ─── LLM call ───────────────────────────────────────────────────────

    async fn execute_llm_call(&self, step: &StepDefinition) -> Result<StepResult, TierError> {
        let inputs = &step.inputs;
        let config = step.config.clone().unwrap_or_default();

        let request = LlmRequest {
            step_id: step.id.clone(),
            strategy: step.strategy,
            messages: build_messages(inputs),
            model: config
                .model
                .or_else(|| inputs.get("model").and_then(|v| v.as_str()).map(String::from)),
            temperature: config
                .temperature
                .or_else(|| inputs.get("temperature").and_then(|v| v.as_f64())),
            max_tokens: config.max_tokens.or_else(|| {
                inputs
                    .get("maxTokens")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as u32)
            }),
        };
        let strategy = request.strategy_name().to_string();

        let response = self.llm.invoke(request).await?;

        Ok(StepResult::success(json!({ "response": response.content })).with_metadata(
            StepMetadata {
                execution_time: response.execution_time,
                tokens_used: Some(response.tokens_used),
                model: Some(response.model),
                strategy: Some(strategy),
                error_code: None,
            },
        ))
    }

    // ─── Tool call ──────────────────────────────────────────────────────

    async fn execute_tool_call(&self, step: &StepDefinition) -> Result<StepResult, TierError> {
        let inputs = &step.inputs;
        let name = ["tool", "toolName", "name"]
            .iter()
            .find_map(|k| inputs.get(*k).and_then(|v| v.as_str()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TierError::Precondition("No tool name provided".to_string()))?;
        let args = inputs
            .get("arguments")
            .or_else(|| inputs.get("args"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        tracing::debug!("[StepExecutor] Step {} calling tool {}", step.id, name);
        let start = Instant::now();
        let result = self.tools.call_tool(name, args).await;

        Ok(StepResult {
            success: result.success,
            outputs: result.result,
            error: result.error,
            metadata: Some(StepMetadata {
                execution_time: start.elapsed().as_millis() as u64,
                error_code: (!result.success).then(|| "COLLABORATOR_FAILED".to_string()),
                ..Default::default()
            }),
        })
    }

    // ─── Code execution ─────────────────────────────────────────────────

    async fn execute_code(&self, step: &StepDefinition) -> Result<StepResult, TierError> {
        let inputs = &step.inputs;
        let code = match inputs.get("code") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => {
                return Err(TierError::Precondition(
                    "No code provided for execution".to_string(),
                ))
            }
        };
        let code_language = inputs
            .get("codeLanguage")
            .or_else(|| inputs.get("language"))
            .and_then(|v| v.as_str())
            .unwrap_or("Javascript")
            .to_string();
        let input = match inputs.get("input") {
            Some(v) => v.clone(),
            None => Value::Object(
                inputs
                    .iter()
                    .filter(|(k, _)| !CODE_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        };

        let start = Instant::now();
        let outcome = self
            .sandbox
            .run_user_code(SandboxRequest {
                code,
                code_language,
                input,
            })
            .await;

        match outcome {
            SandboxOutcome::Output { output } => {
                Ok(StepResult::success(output).with_metadata(StepMetadata {
                    execution_time: start.elapsed().as_millis() as u64,
                    ..Default::default()
                }))
            }
            SandboxOutcome::Error { error } => Err(TierError::Collaborator(error)),
        }
    }
}

/// Normalize the conversation for an LLM step.
///
/// Explicit `messages` win, then a single `prompt`/`message`, then a user
/// message listing the remaining non-reserved inputs. `systemPrompt` is
/// prepended as a system message.
fn build_messages(inputs: &Map<String, Value>) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(system) = inputs.get("systemPrompt") {
        messages.push(ChatMessage::system(value_text(system)));
    }

    if let Some(Value::Array(history)) = inputs.get("messages") {
        for entry in history {
            match entry {
                Value::Object(obj) => {
                    let role = obj.get("role").and_then(|r| r.as_str()).unwrap_or("user");
                    let content = obj.get("content").map(value_text).unwrap_or_default();
                    messages.push(ChatMessage::new(role, content));
                }
                other => messages.push(ChatMessage::user(value_text(other))),
            }
        }
    } else if let Some(prompt) = inputs.get("prompt").or_else(|| inputs.get("message")) {
        messages.push(ChatMessage::user(value_text(prompt)));
    } else {
        let lines: Vec<String> = inputs
            .iter()
            .filter(|(k, _)| !LLM_RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| format!("{}: {}", k, value_text(v)))
            .collect();
        messages.push(ChatMessage::user(lines.join("\n")));
    }

    messages
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Error class for a step failure code.
fn error_type_for(code: &str) -> &'static str {
    match code {
        "PRECONDITION_FAILED" => "precondition",
        "TEMPLATE_RESOLUTION_FAILED" => "resolution",
        "COLLABORATOR_FAILED" => "collaborator",
        "PERSISTENCE_FAILED" => "persistence",
        "BAD_REQUEST" => "bad_request",
        _ => "execution",
    }
}

#[async_trait::async_trait]
impl TierClient for StepExecutor {
    async fn execute(&self, request: TierExecutionRequest) -> Result<ExecutionResult, TierError> {
        let start = Instant::now();
        let execution_id = request.execution_id.clone();

        let mut step = match Self::step_from_request(&request) {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!("[StepExecutor] Rejected request {}: {}", execution_id, e);
                let mut metadata = ExecutionMetadata::for_tier(Tier::Tier3);
                metadata.execution_time = start.elapsed().as_millis() as u64;
                return Ok(ExecutionResult::failed(
                    execution_id,
                    ExecutionError::new(INVALID_REQUEST, e.to_string(), Tier::Tier3, e.kind()),
                    metadata,
                ));
            }
        };

        tracing::info!(
            "[StepExecutor] Executing step {} ({}) for {}",
            step.id,
            step.step_type,
            execution_id
        );
        let result = self.execute_step(&mut step).await;

        let metadata = ExecutionMetadata {
            execution_time: start.elapsed().as_millis() as u64,
            tier: Some(Tier::Tier3),
            step_id: Some(step.id.clone()),
            step_type: Some(step.step_type),
            tokens_used: result.metadata.as_ref().and_then(|m| m.tokens_used),
        };

        if result.success {
            return Ok(ExecutionResult::completed(
                execution_id,
                result.outputs.unwrap_or(Value::Null),
                metadata,
            ));
        }

        let code = result
            .metadata
            .as_ref()
            .and_then(|m| m.error_code.clone())
            .unwrap_or_else(|| STEP_FAILED.to_string());
        let error_type = error_type_for(&code);
        Ok(ExecutionResult::failed(
            execution_id,
            ExecutionError::new(
                code,
                result.error.unwrap_or_else(|| "Step execution failed".to_string()),
                Tier::Tier3,
                error_type,
            ),
            metadata,
        ))
    }

    async fn get_status(&self) -> TierStatus {
        TierStatus {
            healthy: true,
            tier: Tier::Tier3,
            active_executions: 0,
        }
    }
}
