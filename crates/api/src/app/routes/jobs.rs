//! Job records: create, read, list, cancel, delete.
//!
//! Calls that take a per-id lock run through [`AppServices::blocking`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use jobtrack_core::validate_new_job;

use crate::app::{dto, errors, services::AppServices};

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let body = match errors::parse_json_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new_job = match validate_new_job(&body) {
        Ok(n) => n,
        Err(violations) => return errors::validation_error(violations),
    };

    match services.blocking(move |t| t.create(new_job)).await {
        Ok(Ok(job)) => (StatusCode::CREATED, Json(job)).into_response(),
        Ok(Err(e)) => errors::store_error_to_response(e),
        Err(e) => errors::internal_error(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(violations) => return errors::validation_error(violations),
    };

    match services.tracker.list(&filter) {
        Ok(jobs) => Json(dto::JobListResponse {
            count: jobs.len(),
            jobs,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn job_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.tracker.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.tracker.get(&id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.blocking(move |t| t.cancel(&id)).await {
        Ok(Ok(job)) => Json(job).into_response(),
        Ok(Err(e)) => errors::callback_error_to_response(e),
        Err(e) => errors::internal_error(e),
    }
}

pub async fn delete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let target = id.clone();
    match services.blocking(move |t| t.delete(&target)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => {
            errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        Ok(Err(e)) => errors::store_error_to_response(e),
        Err(e) => errors::internal_error(e),
    }
}
