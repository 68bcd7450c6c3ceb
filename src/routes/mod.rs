use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Health check plus the `/api/v1` job endpoints, without middleware layers.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/jobs",
            post(jobs::submit_job).get(jobs::list_jobs),
        )
        .route("/api/v1/jobs/{request_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{request_id}/images", get(jobs::list_images))
        .route("/api/v1/reconcile", post(jobs::reconcile))
        .with_state(state)
}
