use fal_image_jobs::{
    config::AppConfig,
    db::{self, JobStore, PgJobStore, StoreError},
    models::{
        image::NewGeneratedImage,
        job::{ImageSize, JobStatus, NewGenerationJob},
    },
};
use uuid::Uuid;

/// Integration test: PostgreSQL job store
///
/// This test verifies against a real database:
/// 1. Migrations apply cleanly
/// 2. Job creation and duplicate detection
/// 3. Forward-only status updates
/// 4. Image insert uniqueness and image counts
/// 5. Materialization tracking
///
/// Note: This requires a running PostgreSQL instance configured via
/// DATABASE_URL.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_pg_job_store() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let store = PgJobStore::new(db_pool);
    store.health_check().await.expect("Health check failed");

    let request_id = format!("it-{}", Uuid::new_v4());
    let new_job = NewGenerationJob {
        request_id: request_id.clone(),
        prompt: "integration test".to_string(),
        num_images: 2,
        model: "fast-sdxl".to_string(),
        image_size: ImageSize::SquareHd,
        status: JobStatus::InQueue,
        status_url: format!("https://queue.test/fast-sdxl/requests/{request_id}/status"),
        result_url: format!("https://queue.test/fast-sdxl/requests/{request_id}"),
    };

    // 1. Create and read back
    let job = store.create_job(&new_job).await.expect("Failed to create job");
    assert_eq!(job.status, JobStatus::InQueue);
    assert_eq!(job.image_size, ImageSize::SquareHd);
    assert!(job.materialized_at.is_none());

    let fetched = store
        .get_job(&request_id)
        .await
        .expect("Failed to get job")
        .expect("Job missing");
    assert_eq!(fetched.request_id, request_id);

    // 2. Duplicate request id
    assert!(matches!(
        store.create_job(&new_job).await,
        Err(StoreError::DuplicateKey(_))
    ));

    // 3. Status only moves forward
    assert!(store
        .update_job_status(&request_id, JobStatus::InProgress)
        .await
        .unwrap());
    assert!(!store
        .update_job_status(&request_id, JobStatus::InQueue)
        .await
        .unwrap());
    assert!(store
        .update_job_status(&request_id, JobStatus::Completed)
        .await
        .unwrap());
    assert!(!store
        .update_job_status(&request_id, JobStatus::Failed)
        .await
        .unwrap());
    assert!(!store
        .list_non_terminal_jobs()
        .await
        .unwrap()
        .iter()
        .any(|j| j.request_id == request_id));

    // 4. Images
    let pending = store.list_unmaterialized_jobs().await.unwrap();
    assert!(pending.iter().any(|j| j.request_id == request_id));

    let image = NewGeneratedImage {
        request_id: request_id.clone(),
        image_url: "https://cdn.test/1.png".to_string(),
        width: Some(1024),
        height: Some(1024),
        content_type: Some("image/png".to_string()),
        seed: Some(99),
        has_nsfw: false,
    };
    assert!(!store.image_exists(&request_id, &image.image_url).await.unwrap());
    let stored = store.insert_image(&image).await.expect("Failed to insert image");
    assert_eq!(stored.seed, Some(99));
    assert!(store.image_exists(&request_id, &image.image_url).await.unwrap());
    assert!(matches!(
        store.insert_image(&image).await,
        Err(StoreError::DuplicateKey(_))
    ));

    let counts = store.list_jobs_with_image_counts().await.unwrap();
    let entry = counts
        .iter()
        .find(|c| c.job.request_id == request_id)
        .expect("Job missing from listing");
    assert_eq!(entry.image_count, 1);

    // 5. Materialization tracking
    store.mark_materialized(&request_id).await.unwrap();
    let pending = store.list_unmaterialized_jobs().await.unwrap();
    assert!(!pending.iter().any(|j| j.request_id == request_id));

    let images = store.list_images(&request_id).await.unwrap();
    assert_eq!(images.len(), 1);

    // Cleanup
    sqlx::query("DELETE FROM generation_jobs WHERE request_id = $1")
        .bind(&request_id)
        .execute(store.pool())
        .await
        .expect("Cleanup failed");

    println!("✓ PostgreSQL job store integration test passed");
}
