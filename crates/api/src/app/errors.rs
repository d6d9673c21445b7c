use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use scholar_core::DomainError;
use scholar_infra::ServiceError;

/// Handler error: renders as `{ "error": code, "message": text }`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        Self(value)
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(ServiceError::Domain(value))
    }
}

pub fn status_of(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::InvalidStateTransition(_) | DomainError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ServiceError::Domain(e) => json_error(status_of(&e), e.code(), e.to_string()),
            ServiceError::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "internal error",
                )
            }
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "internal failure");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error",
                )
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_kinds_map_to_statuses() {
        let cases = [
            (DomainError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (DomainError::forbidden("x"), StatusCode::FORBIDDEN),
            (DomainError::invalid_transition("x"), StatusCode::BAD_REQUEST),
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(status_of(&err), status, "{err}");
        }
    }

    #[test]
    fn storage_failures_hide_details() {
        let resp = ApiError(ServiceError::Storage("pool timed out".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ApiError(ServiceError::Internal("task panicked".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
