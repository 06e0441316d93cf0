use tracing_subscriber::EnvFilter;

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register descriptions for the metrics emitted by the job manager and
/// worker. Call after installing the recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "analysis_jobs_submitted_total",
        "Total analysis jobs accepted"
    );
    metrics::describe_counter!(
        "analysis_jobs_completed_total",
        "Total analysis jobs completed"
    );
    metrics::describe_counter!(
        "analysis_jobs_failed_total",
        "Total analysis jobs that failed, by failure kind"
    );
    metrics::describe_counter!(
        "analysis_remote_retries_total",
        "Inline retries of transient vision failures"
    );
    metrics::describe_histogram!(
        "analysis_processing_seconds",
        "Time from claim to terminal state of an analysis job"
    );
    metrics::describe_gauge!(
        "analysis_queue_depth",
        "Current number of jobs waiting in the queue"
    );
}
