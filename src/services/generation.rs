use std::sync::Arc;

use crate::db::JobStore;
use crate::error::{JobError, JobResult};
use crate::models::image::GeneratedImage;
use crate::models::job::{GenerationJob, ImageSize, JobWithImageCount};
use crate::services::provider::ImageProvider;
use crate::services::reconciler::{self, ReconcileReport};
use crate::services::submitter;

/// Entry point for everything outside the core: HTTP handlers, the worker
/// loop and tests.
///
/// Built once at startup and shared by handle. It holds no state beyond its
/// collaborators, so overlapping calls are safe.
pub struct GenerationService {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn ImageProvider>,
    api_key: Option<String>,
}

impl GenerationService {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn ImageProvider>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            api_key,
        }
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub async fn submit_job(
        &self,
        prompt: &str,
        num_images: i64,
        model: &str,
        image_size: ImageSize,
    ) -> JobResult<GenerationJob> {
        submitter::submit_job(
            self.store.as_ref(),
            self.provider.as_ref(),
            prompt,
            num_images,
            model,
            image_size,
            self.api_key.as_deref(),
        )
        .await
    }

    pub async fn reconcile(&self) -> JobResult<ReconcileReport> {
        reconciler::reconcile(
            self.store.as_ref(),
            self.provider.as_ref(),
            self.api_key.as_deref(),
        )
        .await
    }

    pub async fn list_jobs_with_image_counts(&self) -> JobResult<Vec<JobWithImageCount>> {
        Ok(self.store.list_jobs_with_image_counts().await?)
    }

    pub async fn get_job(&self, request_id: &str) -> JobResult<GenerationJob> {
        self.store
            .get_job(request_id)
            .await?
            .ok_or_else(|| JobError::NotFound(request_id.to_string()))
    }

    /// Images stored so far for a job. Empty until the job is materialized.
    pub async fn list_images(&self, request_id: &str) -> JobResult<Vec<GeneratedImage>> {
        self.get_job(request_id).await?;
        Ok(self.store.list_images(request_id).await?)
    }
}
