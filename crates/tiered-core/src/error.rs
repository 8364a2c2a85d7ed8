//! Core error types for the tiered execution core.
//!
//! `TierError` is used by every tier, store, and collaborator. The public
//! `execute` entry points never let it escape: it is converted into the
//! `ExecutionResult` / `StepResult` error shape at the tier boundary, using
//! `code()` and `kind()` for attribution.

/// Errors raised while resolving `{{placeholder}}` templates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Unknown placeholder: {0}")]
    UnknownPlaceholder(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// A step or request is missing something it requires. Raised before any side effect.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A collaborator (HTTP client, sandbox, tool, model) reported a failure.
    #[error("{0}")]
    Collaborator(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The tier could not be reached at all.
    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TierError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "PRECONDITION_FAILED",
            Self::Template(_) => "TEMPLATE_RESOLUTION_FAILED",
            Self::Collaborator(_) => "COLLABORATOR_FAILED",
            Self::Database(_) => "PERSISTENCE_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unavailable(_) => "TIER_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Error class within the taxonomy (precondition, resolution, collaborator, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Template(_) => "resolution",
            Self::Collaborator(_) => "collaborator",
            Self::Database(_) => "persistence",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for TierError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}
