use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the job lifecycle metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Generation requests accepted by the provider and recorded"
    );
    metrics::describe_counter!(
        "generation_jobs_transitions_total",
        "Job status changes written by reconciliation, by target status"
    );
    metrics::describe_counter!(
        "generation_images_materialized_total",
        "Image rows stored from completed results"
    );
    metrics::describe_counter!(
        "generation_provider_errors_total",
        "Provider calls that failed during reconciliation"
    );
    metrics::describe_counter!(
        "generation_materialize_failures_total",
        "Materialization attempts left for a later pass"
    );
    metrics::describe_histogram!(
        "generation_reconcile_seconds",
        "Wall time of one reconciliation pass"
    );
}

/// GET /metrics — Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
