//! Language-model seam for `llm_call` steps.
//!
//! The step executor builds an `LlmRequest` (normalized history plus framing
//! strategy) and hands it to a `LanguageModelInvoker`. `PlaceholderLanguageModel`
//! is the default; `MessagesApiInvoker` talks to an Anthropic-compatible API.

mod messages_api;

pub use messages_api::MessagesApiInvoker;

use serde::{Deserialize, Serialize};

use crate::error::TierError;
use crate::models::step::StepStrategy;

pub const PLACEHOLDER_MODEL: &str = "placeholder";
const PLACEHOLDER_TOKENS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub step_id: String,
    pub strategy: Option<StepStrategy>,
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Strategy name used for tagging; `default` when none was set.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.map(|s| s.as_str()).unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: u64,
    /// Milliseconds; zero when not separately measured.
    pub execution_time: u64,
}

#[async_trait::async_trait]
pub trait LanguageModelInvoker: Send + Sync {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, TierError>;
}

/// Deterministic stand-in used when no model backend is configured.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderLanguageModel;

#[async_trait::async_trait]
impl LanguageModelInvoker for PlaceholderLanguageModel {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, TierError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = match request.strategy {
            Some(StepStrategy::Conversational) => format!(
                "[conversational] Step {} response to: {}",
                request.step_id, last_user
            ),
            Some(StepStrategy::Reasoning) => format!(
                "[reasoning] Step {} analysis of {} message(s): {}",
                request.step_id,
                request.messages.len(),
                last_user
            ),
            Some(StepStrategy::Deterministic) => {
                format!("[deterministic] Step {} result for: {}", request.step_id, last_user)
            }
            None => format!("[default] Step {} processed: {}", request.step_id, last_user),
        };

        Ok(LlmResponse {
            content,
            model: PLACEHOLDER_MODEL.to_string(),
            tokens_used: PLACEHOLDER_TOKENS,
            execution_time: 0,
        })
    }
}
