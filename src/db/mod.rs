use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::image::{GeneratedImage, NewGeneratedImage};
use crate::models::job::{GenerationJob, JobStatus, JobWithImageCount, NewGenerationJob};

pub mod memory;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for generation jobs and their images.
///
/// Every component reaches the database through this trait. Individual writes
/// are atomic; no operation spans more than one row write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] if `request_id` already exists.
    async fn create_job(&self, job: &NewGenerationJob) -> Result<GenerationJob, StoreError>;

    async fn get_job(&self, request_id: &str) -> Result<Option<GenerationJob>, StoreError>;

    /// Move a job forward to `status`.
    ///
    /// Returns `true` only if a row changed. Absent jobs, repeated writes of
    /// the current status and backward moves are all no-ops.
    async fn update_job_status(&self, request_id: &str, status: JobStatus)
        -> Result<bool, StoreError>;

    /// Jobs not yet in a terminal state, oldest first.
    async fn list_non_terminal_jobs(&self) -> Result<Vec<GenerationJob>, StoreError>;

    /// Completed jobs whose images have not all been stored yet, oldest first.
    async fn list_unmaterialized_jobs(&self) -> Result<Vec<GenerationJob>, StoreError>;

    async fn mark_materialized(&self, request_id: &str) -> Result<(), StoreError>;

    /// Every job with its stored image count, newest first.
    async fn list_jobs_with_image_counts(&self) -> Result<Vec<JobWithImageCount>, StoreError>;

    async fn image_exists(&self, request_id: &str, image_url: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] on a `(request_id, image_url)` collision.
    async fn insert_image(&self, image: &NewGeneratedImage) -> Result<GeneratedImage, StoreError>;

    /// Images of one job in insertion order.
    async fn list_images(&self, request_id: &str) -> Result<Vec<GeneratedImage>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// [`JobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Translate a unique-constraint violation into [`StoreError::DuplicateKey`].
fn classify(err: sqlx::Error, key: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey(key());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &NewGenerationJob) -> Result<GenerationJob, StoreError> {
        queries::create_job(&self.pool, job)
            .await
            .map_err(|e| classify(e, || format!("request_id={}", job.request_id)))
    }

    async fn get_job(&self, request_id: &str) -> Result<Option<GenerationJob>, StoreError> {
        Ok(queries::get_job(&self.pool, request_id).await?)
    }

    async fn update_job_status(
        &self,
        request_id: &str,
        status: JobStatus,
    ) -> Result<bool, StoreError> {
        Ok(queries::update_job_status(&self.pool, request_id, status).await?)
    }

    async fn list_non_terminal_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        Ok(queries::list_non_terminal_jobs(&self.pool).await?)
    }

    async fn list_unmaterialized_jobs(&self) -> Result<Vec<GenerationJob>, StoreError> {
        Ok(queries::list_unmaterialized_jobs(&self.pool).await?)
    }

    async fn mark_materialized(&self, request_id: &str) -> Result<(), StoreError> {
        Ok(queries::mark_materialized(&self.pool, request_id).await?)
    }

    async fn list_jobs_with_image_counts(&self) -> Result<Vec<JobWithImageCount>, StoreError> {
        Ok(queries::list_jobs_with_image_counts(&self.pool).await?)
    }

    async fn image_exists(&self, request_id: &str, image_url: &str) -> Result<bool, StoreError> {
        Ok(queries::image_exists(&self.pool, request_id, image_url).await?)
    }

    async fn insert_image(&self, image: &NewGeneratedImage) -> Result<GeneratedImage, StoreError> {
        queries::insert_image(&self.pool, image).await.map_err(|e| {
            classify(e, || {
                format!("request_id={} image_url={}", image.request_id, image.image_url)
            })
        })
    }

    async fn list_images(&self, request_id: &str) -> Result<Vec<GeneratedImage>, StoreError> {
        Ok(queries::list_images(&self.pool, request_id).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
