use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SwarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Hard limits for a swarm. Stored here, enforced elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmResources {
    pub max_credits: u64,
    pub max_tokens: u64,
    /// Milliseconds.
    pub max_time: u64,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmConfig {
    pub model: String,
    pub temperature: f64,
    pub auto_approve_tools: bool,
    pub parallel_execution_limit: u32,
}

/// Accumulated consumption, compared against `SwarmResources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    #[serde(default)]
    pub credits: u64,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl ResourceUsage {
    pub fn add(&mut self, delta: &ResourceUsage) {
        self.credits = self.credits.saturating_add(delta.credits);
        self.tokens = self.tokens.saturating_add(delta.tokens);
        self.elapsed_ms = self.elapsed_ms.saturating_add(delta.elapsed_ms);
    }

    /// Names of the limits this usage has crossed.
    pub fn exceeded(&self, limits: &SwarmResources) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.credits > limits.max_credits {
            out.push("maxCredits");
        }
        if self.tokens > limits.max_tokens {
            out.push("maxTokens");
        }
        if self.elapsed_ms > limits.max_time {
            out.push("maxTime");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub agent_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swarm {
    pub swarm_id: String,
    pub name: String,
    pub goal: String,
    pub resources: SwarmResources,
    pub config: SwarmConfig,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
    pub status: SwarmStatus,
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default)]
    pub team: Vec<TeamMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Swarm {
    pub fn new(
        swarm_id: String,
        name: String,
        goal: String,
        resources: SwarmResources,
        config: SwarmConfig,
        user_id: String,
        parent_swarm_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            swarm_id,
            name,
            goal,
            resources,
            config,
            user_id,
            parent_swarm_id,
            status: SwarmStatus::Pending,
            usage: ResourceUsage::default(),
            team: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional per-request overrides for resource limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmResourceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_credits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl SwarmResourceOverrides {
    pub fn apply(&self, base: &SwarmResources) -> SwarmResources {
        SwarmResources {
            max_credits: self.max_credits.unwrap_or(base.max_credits),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            max_time: self.max_time.unwrap_or(base.max_time),
            tools: self.tools.clone().unwrap_or_else(|| base.tools.clone()),
        }
    }
}

/// Optional per-request overrides for swarm behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve_tools: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_execution_limit: Option<u32>,
}

impl SwarmConfigOverrides {
    pub fn apply(&self, base: &SwarmConfig) -> SwarmConfig {
        SwarmConfig {
            model: self.model.clone().unwrap_or_else(|| base.model.clone()),
            temperature: self.temperature.unwrap_or(base.temperature),
            auto_approve_tools: self.auto_approve_tools.unwrap_or(base.auto_approve_tools),
            parallel_execution_limit: self
                .parallel_execution_limit
                .unwrap_or(base.parallel_execution_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SwarmResources {
        SwarmResources {
            max_credits: 100,
            max_tokens: 1_000,
            max_time: 60_000,
            tools: vec![],
        }
    }

    #[test]
    fn test_usage_exceeded_reports_crossed_limits() {
        let mut usage = ResourceUsage::default();
        usage.add(&ResourceUsage { credits: 50, tokens: 1_500, elapsed_ms: 0 });
        assert_eq!(usage.exceeded(&limits()), vec!["maxTokens"]);
        usage.add(&ResourceUsage { credits: 51, tokens: 0, elapsed_ms: 0 });
        assert_eq!(usage.exceeded(&limits()), vec!["maxCredits", "maxTokens"]);
    }

    #[test]
    fn test_overrides_keep_unset_fields() {
        let overrides = SwarmResourceOverrides {
            max_tokens: Some(5),
            ..Default::default()
        };
        let merged = overrides.apply(&limits());
        assert_eq!(merged.max_tokens, 5);
        assert_eq!(merged.max_credits, 100);
    }

    #[test]
    fn test_status_terminal() {
        assert!(SwarmStatus::Completed.is_terminal());
        assert!(!SwarmStatus::Paused.is_terminal());
        assert_eq!(SwarmStatus::from_str("RUNNING"), Some(SwarmStatus::Running));
    }
}
