use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::error::{JobError, JobResult};
use crate::models::generation::SubmitJobRequest;
use crate::models::image::GeneratedImage;
use crate::models::job::{GenerationJob, JobWithImageCount};
use crate::services::reconciler::ReconcileReport;

/// POST /api/v1/jobs — Queue a text-to-image request with the provider.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> JobResult<(StatusCode, Json<GenerationJob>)> {
    let Json(body) = body.map_err(|rejection| JobError::Validation(rejection.body_text()))?;

    let job = state
        .generation
        .submit_job(&body.prompt, body.num_images, &body.model, body.image_size)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/v1/jobs — All jobs with image counts, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> JobResult<Json<Vec<JobWithImageCount>>> {
    Ok(Json(state.generation.list_jobs_with_image_counts().await?))
}

/// GET /api/v1/jobs/{request_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> JobResult<Json<GenerationJob>> {
    Ok(Json(state.generation.get_job(&request_id).await?))
}

/// GET /api/v1/jobs/{request_id}/images
pub async fn list_images(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> JobResult<Json<Vec<GeneratedImage>>> {
    Ok(Json(state.generation.list_images(&request_id).await?))
}

/// POST /api/v1/reconcile — Run one reconciliation pass.
///
/// `any_updated` tells a polling dashboard whether it should refresh.
pub async fn reconcile(State(state): State<AppState>) -> JobResult<Json<ReconcileReport>> {
    Ok(Json(state.generation.reconcile().await?))
}
