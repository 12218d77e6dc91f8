//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, FieldErrors};
use serde_json::json;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Field-scoped problems with the request.
    Validation(FieldErrors),
    /// The request body is not the JSON we expect.
    MalformedBody(String),
    /// No resource matches the request path.
    NotFound,
    /// Domain logic error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::MalformedBody(message) => error_body(StatusCode::BAD_REQUEST, &message),
            ApiError::NotFound => error_body(StatusCode::NOT_FOUND, "Not found."),
            ApiError::Domain(err) => domain_error_to_response(err),
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
        DomainError::InvalidReference(reference) => (
            StatusCode::BAD_REQUEST,
            Json(FieldErrors::single(reference.field(), reference.to_string())),
        )
            .into_response(),
        // Same body whether the row is missing or belongs to someone else.
        DomainError::NotFound { .. } => error_body(StatusCode::NOT_FOUND, "Not found."),
        DomainError::InvalidStatus(_) | DomainError::InvalidTransition { .. } => (
            StatusCode::BAD_REQUEST,
            Json(FieldErrors::single("status", err.to_string())),
        )
            .into_response(),
        DomainError::Unauthenticated | DomainError::InvalidCredentials => {
            error_body(StatusCode::UNAUTHORIZED, &err.to_string())
        }
        DomainError::Store(_) | DomainError::Worker(_) => {
            tracing::error!(error = %err, "internal server error");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Unmatched path parameter");
        ApiError::NotFound
    }
}
