use crate::db::{JobStore, StoreError};
use crate::error::JobResult;
use crate::models::image::NewGeneratedImage;
use crate::models::job::GenerationJob;
use crate::services::provider::ImageProvider;

/// Fetch a completed job's output and store any images not yet recorded.
///
/// Safe to repeat: images already present are skipped, and a duplicate
/// raised by a concurrent insert counts as a skip. The job is marked
/// materialized once every image in the payload is stored. Returns the
/// number of rows inserted by this call.
pub async fn materialize(
    store: &dyn JobStore,
    provider: &dyn ImageProvider,
    job: &GenerationJob,
    api_key: &str,
) -> JobResult<usize> {
    let result = provider.fetch_result(&job.result_url, api_key).await?;

    let mut inserted = 0;
    for (index, image) in result.images.iter().enumerate() {
        if store.image_exists(&job.request_id, &image.url).await? {
            continue;
        }

        let new_image = NewGeneratedImage {
            request_id: job.request_id.clone(),
            image_url: image.url.clone(),
            width: image.width,
            height: image.height,
            content_type: image.content_type.clone(),
            seed: result.seed,
            has_nsfw: result.is_nsfw(index),
        };

        match store.insert_image(&new_image).await {
            Ok(_) => inserted += 1,
            Err(StoreError::DuplicateKey(_)) => {
                tracing::debug!(
                    request_id = %job.request_id,
                    image_url = %image.url,
                    "Image stored concurrently, skipping"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    store.mark_materialized(&job.request_id).await?;

    if inserted > 0 {
        metrics::counter!("generation_images_materialized_total").increment(inserted as u64);
    }

    tracing::info!(
        request_id = %job.request_id,
        images = result.images.len(),
        inserted,
        "Materialized generation result"
    );

    Ok(inserted)
}
