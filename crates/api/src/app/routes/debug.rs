//! Read-only operational views.

use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};
use chrono::Utc;

use crate::app::{dto, errors, services::AppServices};

pub async fn debug_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let summary = match services.tracker.summarize() {
        Ok(s) => s,
        Err(e) => return errors::store_error_to_response(e),
    };

    Json(dto::DebugSnapshot {
        timestamp: Utc::now(),
        process: dto::ProcessInfo {
            pid: std::process::id(),
            uptime_secs: services.uptime().as_secs(),
            store: services.backend(),
            transition_policy: services.tracker.policy(),
        },
        summary,
    })
    .into_response()
}

/// Write and read back a synthetic record to prove the store works.
pub async fn self_test(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.tracker.self_test() {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
