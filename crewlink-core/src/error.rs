use chrono::{DateTime, Utc};
use crewlink_model::{JobStatus, ModelError};
use thiserror::Error;

/// Failures raised by storage adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl From<ModelError> for StoreError {
    fn from(err: ModelError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures of the cryptographic helpers.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("token HMAC key must not be empty")]
    EmptyKey,
    #[error("secure random generation failed: {0}")]
    Entropy(String),
}

/// Outcome taxonomy shared by every marketplace operation.
///
/// None of these are retried by the core; callers decide.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("security code has already been used")]
    AlreadyUsed,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("security code does not match")]
    InvalidCode,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl DomainError {
    pub fn transition(from: JobStatus, to: JobStatus) -> Self {
        DomainError::InvalidTransition(format!("job cannot move from {from} to {to}"))
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        DomainError::Unauthorized(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        DomainError::Conflict(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        DomainError::Validation(reason.into())
    }
}

impl From<ModelError> for DomainError {
    fn from(err: ModelError) -> Self {
        DomainError::Validation(err.to_string())
    }
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_message_names_both_states() {
        let err = DomainError::transition(JobStatus::Completed, JobStatus::Cancelled);
        assert_eq!(
            err.to_string(),
            "invalid transition: job cannot move from COMPLETED to CANCELLED"
        );
    }

    #[test]
    fn model_errors_surface_as_validation() {
        let err: DomainError = ModelError::InvalidCoordinate("latitude 91".into()).into();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
