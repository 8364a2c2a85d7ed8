//! The contract every tier implements.
//!
//! Tiers are wired to each other only through `TierClient`, so any tier can be
//! replaced by a remote proxy or a test double.

use serde::{Deserialize, Serialize};

use crate::error::TierError;
use crate::models::request::TierExecutionRequest;
use crate::models::result::{ExecutionResult, Tier};

/// Health probe returned by `TierClient::get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStatus {
    pub healthy: bool,
    pub tier: Tier,
    pub active_executions: usize,
}

#[async_trait::async_trait]
pub trait TierClient: Send + Sync {
    /// Execute a request.
    ///
    /// `Err` means the tier itself could not handle the request (unreachable,
    /// rejected). Failures of the work are reported as `Ok` with a failed status.
    async fn execute(&self, request: TierExecutionRequest) -> Result<ExecutionResult, TierError>;

    async fn get_status(&self) -> TierStatus;
}
