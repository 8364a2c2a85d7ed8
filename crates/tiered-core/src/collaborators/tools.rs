//! Tool-invocation collaborator.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a tool invocation. Passed through the executor unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(result: impl Serialize) -> Self {
        Self {
            success: true,
            result: Some(serde_json::to_value(result).unwrap_or_default()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(msg.into()),
        }
    }
}

#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call_tool(&self, name: &str, args: Value) -> ToolResult;
}

pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;
type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Named async tool handlers.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        self.tools
            .insert(name.to_string(), Arc::new(move |args| Box::pin(handler(args))));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait::async_trait]
impl ToolInvoker for ToolRegistry {
    async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(handler) => handler(args).await,
            None => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register("echo", |args| async move { ToolResult::success(args) });
        registry.register("fail", |_| async { ToolResult::error("nope") });

        assert_eq!(registry.names(), vec!["echo", "fail"]);
        let ok = registry.call_tool("echo", json!({ "q": "x" })).await;
        assert_eq!(ok.result, Some(json!({ "q": "x" })));
        assert_eq!(registry.call_tool("fail", json!({})).await.error.as_deref(), Some("nope"));
        assert_eq!(
            registry.call_tool("missing", json!({})).await.error.as_deref(),
            Some("Unknown tool: missing")
        );
    }
}
