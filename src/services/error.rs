//! Downstream service errors.

use thiserror::Error;

use crate::retry::Throttling;
use crate::types::GovernanceError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service asked us to slow down (HTTP 429 or a rate-limit code).
    #[error("rate limited: {0}")]
    Throttled(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Throttling for ServiceError {
    fn is_throttled(&self) -> bool {
        matches!(self, ServiceError::Throttled(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            ServiceError::Throttled(e.to_string())
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::InvalidResponse(e.to_string())
    }
}

impl From<ServiceError> for GovernanceError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Throttled(msg) => GovernanceError::Throttled(msg),
            other => GovernanceError::DependencyUnavailable(other.to_string()),
        }
    }
}
