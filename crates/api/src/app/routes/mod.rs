use axum::{
    routing::{delete, get, post},
    Router,
};

pub mod admin;
pub mod callbacks;
pub mod debug;
pub mod jobs;
pub mod system;

/// Job lifecycle, callback and introspection endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/stats", get(jobs::job_stats))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/callback", post(callbacks::job_callback))
        .route("/callback", post(callbacks::generic_callback))
        .route("/debug/jobs", get(debug::debug_jobs))
        .route("/debug/jobs/self-test", post(debug::self_test))
}

/// Destructive maintenance endpoints, only mounted when enabled.
pub fn admin_router() -> Router {
    Router::new().route("/admin/jobs", delete(admin::clear_jobs))
}
