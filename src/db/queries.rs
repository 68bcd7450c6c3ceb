use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::image::{GeneratedImage, NewGeneratedImage};
use crate::models::job::{GenerationJob, ImageSize, JobStatus, JobWithImageCount, NewGenerationJob};

const JOB_COLUMNS: &str = "request_id, prompt, num_images, model, image_size, status, \
     status_url, result_url, materialized_at, created_at";

const IMAGE_COLUMNS: &str =
    "id, request_id, image_url, width, height, content_type, seed, has_nsfw, created_at";

fn decode_error(err: strum::ParseError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn job_from_row(row: &PgRow) -> Result<GenerationJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let image_size: String = row.try_get("image_size")?;

    Ok(GenerationJob {
        request_id: row.try_get("request_id")?,
        prompt: row.try_get("prompt")?,
        num_images: row.try_get("num_images")?,
        model: row.try_get("model")?,
        image_size: ImageSize::from_str(&image_size).map_err(decode_error)?,
        status: JobStatus::from_str(&status).map_err(decode_error)?,
        status_url: row.try_get("status_url")?,
        result_url: row.try_get("result_url")?,
        materialized_at: row.try_get("materialized_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn image_from_row(row: &PgRow) -> Result<GeneratedImage, sqlx::Error> {
    Ok(GeneratedImage {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        image_url: row.try_get("image_url")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        content_type: row.try_get("content_type")?,
        seed: row.try_get("seed")?,
        has_nsfw: row.try_get("has_nsfw")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a new generation job
pub async fn create_job(
    pool: &PgPool,
    job: &NewGenerationJob,
) -> Result<GenerationJob, sqlx::Error> {
    let query = format!(
        "INSERT INTO generation_jobs \
             (request_id, prompt, num_images, model, image_size, status, status_url, result_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {JOB_COLUMNS}"
    );

    let row = sqlx::query(&query)
        .bind(&job.request_id)
        .bind(&job.prompt)
        .bind(job.num_images)
        .bind(&job.model)
        .bind(job.image_size.as_str())
        .bind(job.status.as_str())
        .bind(&job.status_url)
        .bind(&job.result_url)
        .fetch_one(pool)
        .await?;

    job_from_row(&row)
}

/// Get a job by its provider request ID
pub async fn get_job(
    pool: &PgPool,
    request_id: &str,
) -> Result<Option<GenerationJob>, sqlx::Error> {
    let query = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE request_id = $1");

    let row = sqlx::query(&query)
        .bind(request_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Advance job status.
///
/// The write only applies while the stored status is one of the legal
/// predecessors of `status`, so concurrent passes cannot move a job backwards
/// or out of a terminal state.
pub async fn update_job_status(
    pool: &PgPool,
    request_id: &str,
    status: JobStatus,
) -> Result<bool, sqlx::Error> {
    let from: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();
    if from.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE generation_jobs
        SET status = $1
        WHERE request_id = $2
          AND status = ANY($3)
        "#,
    )
    .bind(status.as_str())
    .bind(request_id)
    .bind(&from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get jobs still waiting on the provider (for the reconciler)
pub async fn list_non_terminal_jobs(pool: &PgPool) -> Result<Vec<GenerationJob>, sqlx::Error> {
    let query = format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs \
         WHERE status NOT IN ('COMPLETED', 'FAILED') \
         ORDER BY created_at ASC"
    );

    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(job_from_row).collect()
}

/// Get completed jobs whose result payload has not been stored yet
pub async fn list_unmaterialized_jobs(pool: &PgPool) -> Result<Vec<GenerationJob>, sqlx::Error> {
    let query = format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs \
         WHERE status = 'COMPLETED' AND materialized_at IS NULL \
         ORDER BY created_at ASC"
    );

    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(job_from_row).collect()
}

/// Record that every image of a completed job has been stored
pub async fn mark_materialized(pool: &PgPool, request_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE generation_jobs
        SET materialized_at = NOW()
        WHERE request_id = $1
          AND materialized_at IS NULL
        "#,
    )
    .bind(request_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// List all jobs with their image counts, newest first
pub async fn list_jobs_with_image_counts(
    pool: &PgPool,
) -> Result<Vec<JobWithImageCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT j.request_id, j.prompt, j.num_images, j.model, j.image_size, j.status,
               j.status_url, j.result_url, j.materialized_at, j.created_at,
               COUNT(i.id) AS image_count
        FROM generation_jobs j
        LEFT JOIN generation_images i ON i.request_id = j.request_id
        GROUP BY j.request_id
        ORDER BY j.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(JobWithImageCount {
                job: job_from_row(r)?,
                image_count: r.try_get("image_count")?,
            })
        })
        .collect()
}

/// Check whether an image URL is already stored for a job
pub async fn image_exists(
    pool: &PgPool,
    request_id: &str,
    image_url: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM generation_images
            WHERE request_id = $1 AND image_url = $2
        ) AS found
        "#,
    )
    .bind(request_id)
    .bind(image_url)
    .fetch_one(pool)
    .await?;

    row.try_get("found")
}

/// Insert an image row
pub async fn insert_image(
    pool: &PgPool,
    image: &NewGeneratedImage,
) -> Result<GeneratedImage, sqlx::Error> {
    let query = format!(
        "INSERT INTO generation_images \
             (request_id, image_url, width, height, content_type, seed, has_nsfw) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {IMAGE_COLUMNS}"
    );

    let row = sqlx::query(&query)
        .bind(&image.request_id)
        .bind(&image.image_url)
        .bind(image.width)
        .bind(image.height)
        .bind(&image.content_type)
        .bind(image.seed)
        .bind(image.has_nsfw)
        .fetch_one(pool)
        .await?;

    image_from_row(&row)
}

/// List the images stored for a job
pub async fn list_images(
    pool: &PgPool,
    request_id: &str,
) -> Result<Vec<GeneratedImage>, sqlx::Error> {
    let query = format!(
        "SELECT {IMAGE_COLUMNS} FROM generation_images WHERE request_id = $1 ORDER BY id ASC"
    );

    let rows = sqlx::query(&query).bind(request_id).fetch_all(pool).await?;
    rows.iter().map(image_from_row).collect()
}
