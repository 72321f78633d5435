use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::handlers::JobError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("invalid request parameters, {0}")]
    InvalidForm(String),
    #[error("{0}")]
    Encode(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Job(_) | ApiError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::Job(err) => err.code(),
            ApiError::InvalidForm(_) => "INVALID_FORM",
            ApiError::Encode(_) => "ENCODE_FAILED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
