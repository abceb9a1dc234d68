use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::coordinator::RpcError;
use crate::event_log::LogError;
use crate::replay::ReplayError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Browser automation error: {0}")]
    BrowserError(String),

    #[error("Replay error: {0}")]
    ReplayError(String),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Orchestrator unavailable: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ReplayError> for AppError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::AlreadyRunning => AppError::Conflict(err.to_string()),
            other => AppError::ReplayError(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::BrowserError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Browser Error"),
            AppError::ReplayError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Replay Error"),
            AppError::Log(LogError::Invalid(_)) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::Log(_) | AppError::Rpc(_) => (StatusCode::SERVICE_UNAVAILABLE, "Unavailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let conflict: AppError = ReplayError::AlreadyRunning.into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RecordNotFound("u1".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LogError::Closed).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(LogError::Invalid("uid u1 appears more than once".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
