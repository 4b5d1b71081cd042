//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the shared job tracker
//! - `routes/`: HTTP handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: Arc<AppServices>, config: &AppConfig) -> Router {
    let mut api = routes::router();
    if config.enable_admin {
        api = api.merge(routes::admin_router());
    }

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api.layer(Extension(services)))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
