use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docgate_core_types::DacError;
use docgate_model::ModelError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the HTTP layer. Status codes are assigned here only;
/// the library crates never deal in HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.policy() {
            Some(DacError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
            Some(DacError::EnrichmentResolution { .. }) => StatusCode::UNAUTHORIZED,
            _ if matches!(self, ApiError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ if matches!(self, ApiError::Model(ModelError::DuplicateKey(_))) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.policy() {
            Some(DacError::AccessDenied { .. }) => "access_denied",
            Some(DacError::EnrichmentResolution { .. }) => "unauthenticated",
            Some(DacError::UninitializedContext) => "uninitialized_context",
            _ if matches!(self, ApiError::NotFound(_)) => "not_found",
            _ if matches!(self, ApiError::Model(ModelError::DuplicateKey(_))) => "duplicate_key",
            _ => "internal",
        }
    }

    fn policy(&self) -> Option<&DacError> {
        match self {
            ApiError::Model(err) => err.policy(),
            ApiError::NotFound(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_to_status_codes() {
        let denied = ApiError::from(ModelError::Policy(DacError::denied("Cat", "ownerId")));
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

        let duplicate = ApiError::from(ModelError::DuplicateKey("a".into()));
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert_eq!(duplicate.code(), "duplicate_key");

        assert_eq!(ApiError::NotFound("cat").status_code(), StatusCode::NOT_FOUND);
    }
}
