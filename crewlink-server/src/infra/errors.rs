use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crewlink_core::{DomainError, StoreError, error::CryptoError};

use crate::api::ApiResponse;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message);
        (self.status, body).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let message = err.to_string();
        match err {
            DomainError::Conflict(_)
            | DomainError::AlreadyUsed
            | DomainError::InvalidTransition(_) => Self::conflict(message),
            DomainError::Validation(_) => Self::bad_request(message),
            DomainError::InvalidCode => Self::unprocessable(message),
            DomainError::NotFound(_) => Self::not_found(message),
            DomainError::Expired { .. } => Self::gone(message),
            DomainError::Unauthorized(_) => Self::forbidden(message),
            DomainError::Crypto(err) => err.into(),
            DomainError::Storage(err) => err.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = ?err, "storage operation failed");
        Self::internal("Storage operation failed")
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        tracing::error!(error = %err, "credential generation failed");
        Self::internal("Credential generation failed")
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "unexpected failure");
        Self::internal("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewlink_model::JobStatus;

    #[test]
    fn domain_errors_map_to_http_statuses() {
        let cases = [
            (DomainError::conflict("taken"), StatusCode::CONFLICT),
            (DomainError::AlreadyUsed, StatusCode::CONFLICT),
            (
                DomainError::transition(JobStatus::Completed, JobStatus::Cancelled),
                StatusCode::CONFLICT,
            ),
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::InvalidCode, StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::NotFound("job"), StatusCode::NOT_FOUND),
            (
                DomainError::Expired {
                    expired_at: Utc::now(),
                },
                StatusCode::GONE,
            ),
            (DomainError::unauthorized("nope"), StatusCode::FORBIDDEN),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn transitions_keep_a_distinct_message() {
        let conflict = AppError::from(DomainError::conflict("job has already been claimed"));
        let transition = AppError::from(DomainError::transition(
            JobStatus::Completed,
            JobStatus::InProgress,
        ));
        assert_eq!(conflict.status, transition.status);
        assert!(transition.message.starts_with("invalid transition"));
        assert!(conflict.message.starts_with("conflict"));
    }

    #[test]
    fn storage_failures_are_redacted() {
        let err = AppError::from(DomainError::Storage(StoreError::Internal(
            "connection reset by 10.0.0.7".into(),
        )));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("10.0.0.7"));
    }
}
