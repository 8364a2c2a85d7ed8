//! Anthropic-compatible Messages API invoker.
//!
//! POST {base_url}/v1/messages
//! Headers:
//!   x-api-key: {api_key}
//!   anthropic-version: 2023-06-01

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::{ChatMessage, LanguageModelInvoker, LlmRequest, LlmResponse};
use crate::config::LlmConfig;
use crate::error::TierError;
use crate::models::step::StepStrategy;

const REASONING_INSTRUCTION: &str =
    "Think through the problem step by step before giving your final answer.";

pub struct MessagesApiInvoker {
    client: reqwest::Client,
    config: LlmConfig,
}

impl MessagesApiInvoker {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    /// Build the request body. System messages are folded into `system`.
    fn build_body(&self, request: &LlmRequest) -> Value {
        let mut system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        if request.strategy == Some(StepStrategy::Reasoning) {
            system.push(REASONING_INSTRUCTION);
        }

        let messages: Vec<&ChatMessage> =
            request.messages.iter().filter(|m| m.role != "system").collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages,
        });

        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }

        let temperature = match request.strategy {
            Some(StepStrategy::Deterministic) => Some(0.0),
            _ => request.temperature,
        };
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }

        body
    }
}

#[async_trait::async_trait]
impl LanguageModelInvoker for MessagesApiInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, TierError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = self.build_body(&request);
        let start = Instant::now();

        tracing::info!(
            "[MessagesApi] Calling {} for step {} (strategy: {})",
            url,
            request.step_id,
            request.strategy_name()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TierError::Collaborator(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TierError::Collaborator(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(TierError::Collaborator(format!("API returned {}: {}", status, text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| TierError::Collaborator(format!("Failed to parse response JSON: {}", e)))?;

        Ok(parse_response(&json, &body, start.elapsed().as_millis() as u64))
    }
}

fn parse_response(json: &Value, body: &Value, execution_time: u64) -> LlmResponse {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let tokens_used = json
        .get("usage")
        .map(|u| {
            u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0)
                + u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0)
        })
        .unwrap_or(0);

    let model = json
        .get("model")
        .and_then(|m| m.as_str())
        .or_else(|| body.get("model").and_then(|m| m.as_str()))
        .unwrap_or_default()
        .to_string();

    LlmResponse {
        content,
        model,
        tokens_used,
        execution_time,
    }
}
