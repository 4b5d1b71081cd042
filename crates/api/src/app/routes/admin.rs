use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use crate::app::{dto, errors, services::AppServices};

/// Drop every job record. Mounted only with `JOBTRACK_ENABLE_ADMIN=true`.
pub async fn clear_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.blocking(|t| t.clear()).await {
        Ok(Ok(cleared)) => {
            tracing::warn!(cleared, "job store cleared via admin endpoint");
            Json(dto::ClearedResponse { cleared }).into_response()
        }
        Ok(Err(e)) => errors::store_error_to_response(e),
        Err(e) => errors::internal_error(e),
    }
}
