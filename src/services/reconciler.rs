use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;

use crate::db::JobStore;
use crate::error::{JobError, JobResult};
use crate::models::job::{GenerationJob, JobStatus};
use crate::services::materializer;
use crate::services::provider::ImageProvider;
use crate::services::usable_api_key;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// At least one job changed status.
    pub any_updated: bool,
    /// Jobs whose status endpoint was called.
    pub polled: usize,
    /// Jobs left untouched because the provider or store failed.
    pub skipped: usize,
    /// Status changes written.
    pub transitioned: usize,
    /// Image rows inserted across all materializations.
    pub images_inserted: usize,
}

/// Run one reconciliation pass.
///
/// Polls every non-terminal job oldest first, writes forward status changes
/// and materializes jobs reported `COMPLETED`. A failure on one job never
/// stops the pass. Completed jobs whose results were not stored on an earlier
/// pass are then retried. There is no retry inside a pass; callers invoke
/// this again on their own schedule.
pub async fn reconcile(
    store: &dyn JobStore,
    provider: &dyn ImageProvider,
    api_key: Option<&str>,
) -> JobResult<ReconcileReport> {
    let started = Instant::now();
    let open_jobs = store.list_non_terminal_jobs().await?;

    let Some(api_key) = usable_api_key(api_key) else {
        if open_jobs.is_empty() && store.list_unmaterialized_jobs().await?.is_empty() {
            return Ok(ReconcileReport::default());
        }
        return Err(JobError::Config(
            "provider API key is not configured".to_string(),
        ));
    };

    let mut report = ReconcileReport::default();
    let mut attempted: HashSet<String> = HashSet::new();

    for job in &open_jobs {
        report.polled += 1;

        let status = match provider.poll_status(&job.status_url, api_key).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::debug!(
                    request_id = %job.request_id,
                    "No readable status, retrying next pass"
                );
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %job.request_id,
                    error = %e,
                    "Status poll failed, retrying next pass"
                );
                metrics::counter!(
                    "generation_provider_errors_total",
                    "operation" => "poll_status"
                )
                .increment(1);
                report.skipped += 1;
                continue;
            }
        };

        if status != job.status {
            match store.update_job_status(&job.request_id, status).await {
                Ok(true) => {
                    report.any_updated = true;
                    report.transitioned += 1;
                    metrics::counter!(
                        "generation_jobs_transitions_total",
                        "status" => status.as_str()
                    )
                    .increment(1);
                    tracing::info!(
                        request_id = %job.request_id,
                        from = %job.status,
                        to = %status,
                        "Job status changed"
                    );
                }
                Ok(false) => {
                    tracing::debug!(
                        request_id = %job.request_id,
                        stored = %job.status,
                        reported = %status,
                        "Ignored status that does not move the job forward"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %job.request_id,
                        error = %e,
                        "Failed to store job status"
                    );
                    report.skipped += 1;
                    continue;
                }
            }
        }

        if status == JobStatus::Completed {
            attempted.insert(job.request_id.clone());
            report.images_inserted += materialize_logged(store, provider, job, api_key).await;
        }
    }

    // Completed on an earlier pass (or by a concurrent one) but never stored.
    match store.list_unmaterialized_jobs().await {
        Ok(pending) => {
            for job in pending.iter().filter(|j| !attempted.contains(&j.request_id)) {
                report.images_inserted += materialize_logged(store, provider, job, api_key).await;
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list unmaterialized jobs");
        }
    }

    metrics::histogram!("generation_reconcile_seconds").record(started.elapsed().as_secs_f64());

    tracing::debug!(
        polled = report.polled,
        skipped = report.skipped,
        transitioned = report.transitioned,
        images_inserted = report.images_inserted,
        "Reconciliation pass complete"
    );

    Ok(report)
}

/// Materialize and swallow the error; the job stays unmaterialized and is
/// picked up again by a later pass.
async fn materialize_logged(
    store: &dyn JobStore,
    provider: &dyn ImageProvider,
    job: &GenerationJob,
    api_key: &str,
) -> usize {
    match materializer::materialize(store, provider, job, api_key).await {
        Ok(inserted) => inserted,
        Err(e) => {
            tracing::warn!(
                request_id = %job.request_id,
                error = %e,
                "Materialization failed, retrying next pass"
            );
            metrics::counter!("generation_materialize_failures_total").increment(1);
            0
        }
    }
}
