use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::FollowError;
use crate::ingest::SignalError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("record not found".into()),
            StoreError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            StoreError::Backend(inner) => AppError::Internal(inner),
        }
    }
}

impl From<SignalError> for AppError {
    fn from(e: SignalError) -> Self {
        match e {
            SignalError::Store(inner) => inner.into(),
            other => AppError::Unprocessable(other.to_string()),
        }
    }
}

impl From<FollowError> for AppError {
    fn from(e: FollowError) -> Self {
        match e {
            FollowError::MasterNotFound => AppError::NotFound(e.to_string()),
            FollowError::Store(inner) => inner.into(),
            FollowError::Config(inner) => AppError::Unprocessable(inner.to_string()),
            other => AppError::Unprocessable(other.to_string()),
        }
    }
}
