use thiserror::Error;

use super::QuotaStatus;

/// Errors surfaced by the governance layer.
///
/// Downstream call failures (`ServiceError`) and storage failures are
/// folded into this taxonomy before they reach a caller.
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("quota exceeded: {reason}")]
    QuotaExceeded {
        reason: String,
        status: Box<QuotaStatus>,
    },

    #[error("downstream rate limit: {0}")]
    Throttled(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Response class an error maps to at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    TooManyRequests,
    Server,
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GovernanceError::InvalidTenant(_)
            | GovernanceError::InvalidPlan(_)
            | GovernanceError::InvalidRequest(_)
            | GovernanceError::NotFound(_) => ErrorClass::Client,
            GovernanceError::QuotaExceeded { .. } => ErrorClass::TooManyRequests,
            GovernanceError::Throttled(_)
            | GovernanceError::DependencyUnavailable(_)
            | GovernanceError::Storage(_) => ErrorClass::Server,
        }
    }

    /// Message safe to show to the caller. Server-class errors never leak
    /// internal detail or tenant data.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Server => "internal server error".to_string(),
            ErrorClass::TooManyRequests | ErrorClass::Client => self.to_string(),
        }
    }

    /// Status snapshot attached to a quota denial.
    pub fn quota_status(&self) -> Option<&QuotaStatus> {
        match self {
            GovernanceError::QuotaExceeded { status, .. } => Some(status),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for GovernanceError {
    fn from(e: sqlx::Error) -> Self {
        GovernanceError::Storage(e.to_string())
    }
}

impl GovernanceError {
    /// Failure of the vector store or blob store.
    pub fn unavailable(e: anyhow::Error) -> Self {
        GovernanceError::DependencyUnavailable(format!("{:#}", e))
    }
}

/// Ledger and registry failures.
impl From<anyhow::Error> for GovernanceError {
    fn from(e: anyhow::Error) -> Self {
        GovernanceError::Storage(format!("{:#}", e))
    }
}
