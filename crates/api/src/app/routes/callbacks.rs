//! Inbound notifications from external workers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::app::{dto, errors, services::AppServices};

/// Status update for a known job. Never creates a record.
pub async fn job_callback(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = match errors::parse_json_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let target = id.clone();
    match services.blocking(move |t| t.handle_callback(&target, &body)).await {
        Ok(Ok(job)) => Json(dto::CallbackAck { success: true, job }).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(job_id = %id, error = %e, "callback rejected");
            errors::callback_error_to_response(e)
        }
        Err(e) => errors::internal_error(e),
    }
}

/// Catch-all notification sink: log and acknowledge.
pub async fn generic_callback(body: Bytes) -> axum::response::Response {
    let payload = match errors::parse_json_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    tracing::info!(payload = %payload, "generic callback received");

    Json(dto::GenericCallbackAck {
        received: true,
        timestamp: Utc::now(),
    })
    .into_response()
}
