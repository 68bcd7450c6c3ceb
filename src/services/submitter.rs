use garde::Validate;

use crate::db::JobStore;
use crate::error::{JobError, JobResult};
use crate::models::generation::GenerationRequest;
use crate::models::job::{clamp_num_images, GenerationJob, ImageSize, JobStatus, NewGenerationJob};
use crate::services::provider::ImageProvider;
use crate::services::usable_api_key;

/// Validate a generation request, queue it with the provider and record it.
///
/// Checks run in order: blank prompt, image count clamp, field bounds, API
/// key. The provider is only called once all of them pass, and the job row is
/// only written once the provider has accepted the request, so a failure at
/// any step leaves the store untouched.
pub async fn submit_job(
    store: &dyn JobStore,
    provider: &dyn ImageProvider,
    prompt: &str,
    num_images: i64,
    model: &str,
    image_size: ImageSize,
    api_key: Option<&str>,
) -> JobResult<GenerationJob> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(JobError::Validation("prompt is required".to_string()));
    }

    let clamped = clamp_num_images(num_images);
    if i64::from(clamped) != num_images {
        tracing::debug!(requested = num_images, clamped, "Clamped image count");
    }

    let request = GenerationRequest {
        prompt: prompt.to_string(),
        num_images: clamped,
        model: model.trim().to_string(),
        image_size,
    };
    request
        .validate()
        .map_err(|report| JobError::Validation(report.to_string()))?;

    let api_key = usable_api_key(api_key)
        .ok_or_else(|| JobError::Config("provider API key is not configured".to_string()))?;

    let submitted = provider.submit(api_key, &request).await.map_err(|e| {
        tracing::warn!(model = %request.model, error = %e, "Provider refused generation request");
        e
    })?;

    let job = store
        .create_job(&NewGenerationJob {
            request_id: submitted.request_id,
            prompt: request.prompt,
            num_images: request.num_images,
            model: request.model,
            image_size: request.image_size,
            status: JobStatus::InQueue,
            status_url: submitted.status_url,
            result_url: submitted.result_url,
        })
        .await?;

    metrics::counter!("generation_jobs_submitted_total").increment(1);

    tracing::info!(
        request_id = %job.request_id,
        model = %job.model,
        num_images = job.num_images,
        image_size = %job.image_size,
        "Generation job submitted"
    );

    Ok(job)
}
