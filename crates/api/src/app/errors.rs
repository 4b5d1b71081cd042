use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobtrack_core::FieldViolation;
use jobtrack_infra::jobs::{CallbackError, JobStoreError};

pub fn callback_error_to_response(err: CallbackError) -> axum::response::Response {
    match err {
        CallbackError::Validation(violations) => validation_error(violations),
        CallbackError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        CallbackError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "invalid_transition",
                "message": format!("cannot move job from {from} to {to}"),
                "from": from,
                "to": to,
            })),
        )
            .into_response(),
        CallbackError::Internal(detail) => internal_error(detail),
    }
}

pub fn store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::AlreadyExists(id) => {
            json_error(StatusCode::CONFLICT, "conflict", format!("job {id} already exists"))
        }
        JobStoreError::Storage(detail) => internal_error(detail),
    }
}

/// 400 listing every offending field.
pub fn validation_error(violations: Vec<FieldViolation>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": "request body failed validation",
            "violations": violations,
        })),
    )
        .into_response()
}

/// Details go to the log, never to the caller.
pub fn internal_error(detail: impl std::fmt::Display) -> axum::response::Response {
    tracing::error!(error = %detail, "request failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a request body as JSON, mapping failures to a 400.
pub fn parse_json_body(body: &[u8]) -> Result<serde_json::Value, axum::response::Response> {
    serde_json::from_slice(body).map_err(|e| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_json",
            format!("request body is not valid JSON: {e}"),
        )
    })
}

pub fn parse_job_id(raw: &str) -> Result<jobtrack_core::JobId, axum::response::Response> {
    jobtrack_core::JobId::parse(raw)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
