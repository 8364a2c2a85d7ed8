//! Runtime configuration.
//!
//! Every section has a `Default`; `TieredConfig::from_env()` overlays values
//! from the environment so the CLI and embedding hosts share one source.

use crate::models::swarm::{SwarmConfig, SwarmResources};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub default_timeout_ms: u64,
    pub default_retries: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            default_retries: 0,
            retry_backoff_ms: 250,
            user_agent: format!("tiered/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub node_bin: String,
    pub python_bin: String,
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            node_bin: "node".to_string(),
            python_bin: "python3".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Messages-API settings. The placeholder model is used when `api_key` is empty.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Defaults merged under per-request swarm overrides.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub default_resources: SwarmResources,
    pub default_swarm_config: SwarmConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_resources: SwarmResources {
                max_credits: 10_000,
                max_tokens: 1_000_000,
                max_time: 3_600_000,
                tools: Vec::new(),
            },
            default_swarm_config: SwarmConfig {
                model: LlmConfig::default().model,
                temperature: 0.7,
                auto_approve_tools: false,
                parallel_execution_limit: 5,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TieredConfig {
    pub db_path: String,
    pub credential_env_prefix: String,
    pub http: HttpClientConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub coordinator: CoordinatorConfig,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            db_path: "tiered.db".to_string(),
            credential_env_prefix: "TIERED_API_KEY_".to_string(),
            http: HttpClientConfig::default(),
            sandbox: SandboxConfig::default(),
            llm: LlmConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl TieredConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let num = |key: &str| {
            get(key).and_then(|v| match v.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("[Config] Ignoring non-numeric {}={}", key, v);
                    None
                }
            })
        };

        if let Some(v) = get("TIERED_DB_PATH") {
            cfg.db_path = v;
        }
        if let Some(v) = get("TIERED_CREDENTIAL_PREFIX") {
            cfg.credential_env_prefix = v;
        }
        if let Some(v) = num("TIERED_HTTP_TIMEOUT_MS") {
            cfg.http.default_timeout_ms = v;
        }
        if let Some(v) = num("TIERED_HTTP_RETRIES") {
            cfg.http.default_retries = v as u32;
        }
        if let Some(v) = num("TIERED_SANDBOX_TIMEOUT_MS") {
            cfg.sandbox.timeout_ms = v;
        }
        if let Some(v) = get("TIERED_NODE_BIN") {
            cfg.sandbox.node_bin = v;
        }
        if let Some(v) = get("TIERED_PYTHON_BIN") {
            cfg.sandbox.python_bin = v;
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            cfg.llm.base_url = v;
        }
        if let Some(v) = get("ANTHROPIC_AUTH_TOKEN").or_else(|| get("ANTHROPIC_API_KEY")) {
            cfg.llm.api_key = v;
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            cfg.llm.model = v.clone();
            cfg.coordinator.default_swarm_config.model = v;
        }
        if let Some(v) = num("TIERED_DEFAULT_MAX_CREDITS") {
            cfg.coordinator.default_resources.max_credits = v;
        }
        if let Some(v) = num("TIERED_DEFAULT_MAX_TOKENS") {
            cfg.coordinator.default_resources.max_tokens = v;
        }
        if let Some(v) = num("TIERED_DEFAULT_MAX_TIME_MS") {
            cfg.coordinator.default_resources.max_time = v;
        }

        cfg
    }
}
