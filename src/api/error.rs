//! Handler error type. Every failure renders as `{"error": <code>, "message": ...}`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use strum::IntoStaticStr;
use thiserror::Error;

use crate::{geocode::GeocodeError, ingest::IngestError, repo::StoreError};

#[derive(Debug, Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("upstream provider error: {0}")]
    UpstreamError(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        use ApiError::*;
        match self {
            NotFound(_) => StatusCode::NOT_FOUND,
            BadRequest(_) | ValidationError(_) => StatusCode::BAD_REQUEST,
            Unauthorized => StatusCode::UNAUTHORIZED,
            Conflict(_) => StatusCode::CONFLICT,
            InternalError(_) | DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable code, e.g. `not_found`.
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // internals stay in the log
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            ApiError::ServiceUnavailable(_) | ApiError::UpstreamError(_) => {
                tracing::warn!(error = %self, "dependency unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "request rejected");
                self.to_string()
            }
        };

        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => ApiError::NotFound(error.to_string()),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Backend(e) => ApiError::DatabaseError(format!("{e:#}")),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Invalid(e) => e.into(),
            IngestError::UnknownDevice(serial) => {
                ApiError::NotFound(format!("no device with serial {serial}"))
            }
            IngestError::Store(e) => e.into(),
        }
    }
}

impl From<GeocodeError> for ApiError {
    fn from(error: GeocodeError) -> Self {
        match error {
            GeocodeError::NoResult { .. } => ApiError::NotFound(error.to_string()),
            GeocodeError::NoProviders => ApiError::ServiceUnavailable(error.to_string()),
            GeocodeError::Http { .. } | GeocodeError::Status { .. } => {
                ApiError::UpstreamError(error.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{error:#}"))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

macro_rules! reject_as_bad_request {
    ($($rejection:ty),+) => {
        $(impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                ApiError::BadRequest(rejection.body_text())
            }
        })+
    };
}

reject_as_bad_request!(JsonRejection, QueryRejection, PathRejection);
