//! In-process [`JobStore`] used by tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{JobStore, StoreError};
use crate::models::image::{GeneratedImage, NewGeneratedImage};
use crate::models::job::{GenerationJob, JobStatus, JobWithImageCount, NewGenerationJob};

#[derive(Default)]
struct Tables {
    /// Insertion order; ties on `created_at` resolve by position.
    jobs: Vec<GenerationJob>,
    images: Vec<GeneratedImage>,
    next_image_id: i64,
}

/// [`JobStore`] held entirely in memory behind a single lock.
#[derive(Default)]
pub struct MemoryJobStore {
    tables: RwLock<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.tables.read().await.jobs.len()
    }

    pub async fn image_count(&self) -> usize {
        self.tables.read().await.images.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &NewGenerationJob) -> Result<GenerationJob, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.iter().any(|j| j.request_id == job.request_id) {
            return Err(StoreError::DuplicateKey(format!(
                "request_id={}",
                job.request_id
            )));
        }

        let created = GenerationJob {
            request_id: job.request_id.clone(),
            prompt: job.prompt.clone(),
            num_images: job.num_images,
            model: job.model.clone(),
            image_size: job.image_size,
            status: job.status,
            status_url: job.status_url.clone(),
            result_url: job.result_url.clone(),
            materialized_at: None,
            created_at: Utc::now(),
        };
        tables.jobs.push(created.clone());
        Ok(created)
    }

    async fn get_job(&self, request_id: &str) -> Result<Option<GenerationJob>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.jobs.iter().find(|j| j.request_id == request_id).cloned())
    }

    async fn update_job_status(
        &self,
        request_id: &str,
        status: JobStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.jobs.iter_mut().find(|j| j.request_id == request_id) {
            Some(job) if job.status.can_advance_to(status) => {
                job.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_non_terminal_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<GenerationJob> = tables
            .jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn list_unmaterialized_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<GenerationJob> = tables
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed && j.materialized_at.is_none())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn mark_materialized(&self, request_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(job) = tables
            .jobs
            .iter_mut()
            .find(|j| j.request_id == request_id && j.materialized_at.is_none())
        {
            job.materialized_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_jobs_with_image_counts(&self) -> Result<Vec<JobWithImageCount>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<JobWithImageCount> = tables
            .jobs
            .iter()
            .rev()
            .map(|job| JobWithImageCount {
                job: job.clone(),
                image_count: tables
                    .images
                    .iter()
                    .filter(|i| i.request_id == job.request_id)
                    .count() as i64,
            })
            .collect();
        rows.sort_by(|a, b| b.job.created_at.cmp(&a.job.created_at));
        Ok(rows)
    }

    async fn image_exists(&self, request_id: &str, image_url: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .images
            .iter()
            .any(|i| i.request_id == request_id && i.image_url == image_url))
    }

    async fn insert_image(&self, image: &NewGeneratedImage) -> Result<GeneratedImage, StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .images
            .iter()
            .any(|i| i.request_id == image.request_id && i.image_url == image.image_url)
        {
            return Err(StoreError::DuplicateKey(format!(
                "request_id={} image_url={}",
                image.request_id, image.image_url
            )));
        }

        tables.next_image_id += 1;
        let stored = GeneratedImage {
            id: tables.next_image_id,
            request_id: image.request_id.clone(),
            image_url: image.image_url.clone(),
            width: image.width,
            height: image.height,
            content_type: image.content_type.clone(),
            seed: image.seed,
            has_nsfw: image.has_nsfw,
            created_at: Utc::now(),
        };
        tables.images.push(stored.clone());
        Ok(stored)
    }

    async fn list_images(&self, request_id: &str) -> Result<Vec<GeneratedImage>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .images
            .iter()
            .filter(|i| i.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::ImageSize;

    fn new_job(request_id: &str) -> NewGenerationJob {
        NewGenerationJob {
            request_id: request_id.to_string(),
            prompt: "a cat".to_string(),
            num_images: 1,
            model: "fast-sdxl".to_string(),
            image_size: ImageSize::Square,
            status: JobStatus::InQueue,
            status_url: format!("http://queue/{request_id}/status"),
            result_url: format!("http://queue/{request_id}"),
        }
    }

    fn new_image(request_id: &str, url: &str) -> NewGeneratedImage {
        NewGeneratedImage {
            request_id: request_id.to_string(),
            image_url: url.to_string(),
            width: Some(512),
            height: Some(512),
            content_type: Some("image/png".to_string()),
            seed: Some(42),
            has_nsfw: false,
        }
    }

    #[tokio::test]
    async fn test_duplicate_job_rejected() {
        let store = MemoryJobStore::new();
        store.create_job(&new_job("req-1")).await.unwrap();

        let err = store.create_job(&new_job("req-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let store = MemoryJobStore::new();
        store.create_job(&new_job("req-1")).await.unwrap();

        assert!(store.update_job_status("req-1", JobStatus::InProgress).await.unwrap());
        // Same status twice is a no-op.
        assert!(!store.update_job_status("req-1", JobStatus::InProgress).await.unwrap());
        // Backwards is ignored.
        assert!(!store.update_job_status("req-1", JobStatus::InQueue).await.unwrap());
        assert!(store.update_job_status("req-1", JobStatus::Completed).await.unwrap());
        // Terminal is final.
        assert!(!store.update_job_status("req-1", JobStatus::Failed).await.unwrap());

        let job = store.get_job("req-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_missing_job_is_noop() {
        let store = MemoryJobStore::new();
        assert!(!store.update_job_status("nope", JobStatus::Completed).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_order() {
        let store = MemoryJobStore::new();
        for id in ["req-1", "req-2", "req-3"] {
            store.create_job(&new_job(id)).await.unwrap();
        }
        store.update_job_status("req-2", JobStatus::Failed).await.unwrap();

        let open: Vec<String> = store
            .list_non_terminal_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.request_id)
            .collect();
        assert_eq!(open, vec!["req-1", "req-3"]);

        let all: Vec<String> = store
            .list_jobs_with_image_counts()
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.job.request_id)
            .collect();
        assert_eq!(all, vec!["req-3", "req-2", "req-1"]);
    }

    #[tokio::test]
    async fn test_duplicate_image_rejected() {
        let store = MemoryJobStore::new();
        store.create_job(&new_job("req-1")).await.unwrap();

        let image = new_image("req-1", "http://x/1.png");
        store.insert_image(&image).await.unwrap();
        assert!(store.image_exists("req-1", "http://x/1.png").await.unwrap());

        let err = store.insert_image(&image).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        // Same URL under another job is a different key.
        store.create_job(&new_job("req-2")).await.unwrap();
        store.insert_image(&new_image("req-2", "http://x/1.png")).await.unwrap();

        let counts = store.list_jobs_with_image_counts().await.unwrap();
        assert!(counts.iter().all(|row| row.image_count == 1));
    }

    #[tokio::test]
    async fn test_unmaterialized_tracking() {
        let store = MemoryJobStore::new();
        store.create_job(&new_job("req-1")).await.unwrap();
        store.update_job_status("req-1", JobStatus::Completed).await.unwrap();

        assert_eq!(store.list_unmaterialized_jobs().await.unwrap().len(), 1);
        store.mark_materialized("req-1").await.unwrap();
        assert!(store.list_unmaterialized_jobs().await.unwrap().is_empty());
        assert!(store.get_job("req-1").await.unwrap().unwrap().materialized_at.is_some());
    }
}
