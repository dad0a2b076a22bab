//! API error type and its status mapping

use super::types::ErrorResponse;
use crate::core_engine::{ConnectError, TemplateError};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Template(TemplateError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Template(_) => StatusCode::BAD_REQUEST,
            ApiError::Connect(ConnectError::AlreadyEstablishing) => StatusCode::CONFLICT,
            ApiError::Connect(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Template(TemplateError::Render(e)) => Some(format!("{:?}", e)),
            ApiError::Internal(e) => e.chain().nth(1).map(|cause| cause.to_string()),
            _ => None,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid upload: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = ErrorResponse { error: self.to_string(), details: self.details() };
        (status, Json(body)).into_response()
    }
}
