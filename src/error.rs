use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::economy::EconomyError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Economy(#[from] EconomyError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::catalog::CatalogError> for AppError {
    fn from(err: crate::catalog::CatalogError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Economy(err) => economy_response(err),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                internal()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "internal server error", "status": "INTERNAL" }),
    )
}

fn economy_response(err: EconomyError) -> (StatusCode, serde_json::Value) {
    let code = err.code();
    match err {
        EconomyError::InvalidInput(msg) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": msg, "status": code }),
        ),
        EconomyError::NotFound(msg) => (
            StatusCode::NOT_FOUND,
            json!({ "error": msg, "status": code }),
        ),
        EconomyError::PreconditionFailed(reason) => (
            StatusCode::CONFLICT,
            json!({ "error": reason.to_string(), "status": code }),
        ),
        EconomyError::Contended => (
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": "another action is in progress", "status": code, "retryable": true }),
        ),
        EconomyError::WriteConflict => (
            StatusCode::CONFLICT,
            json!({ "error": "state changed, retry the action", "status": code, "retryable": true }),
        ),
        EconomyError::Internal(msg) => {
            tracing::error!(error = %msg, "Economy action failed");
            internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::Reason;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_precondition_carries_reason_code() {
        let (status, body) =
            render(EconomyError::PreconditionFailed(Reason::PetIsOutOfMana).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "PET_IS_OUT_OF_MANA");
    }

    #[tokio::test]
    async fn test_write_conflict_is_retryable() {
        let (status, body) = render(EconomyError::WriteConflict.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "WRITE_CONFLICT");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_contended_is_too_many_requests() {
        let (status, _) = render(EconomyError::Contended.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let (status, body) =
            render(EconomyError::Internal("disk I/O error at /var/db".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("/var/db"));
    }
}
