use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::AnalysisError;
use crate::services::job_manager::{AnalysisManager, ProcessOutcome};
use crate::services::queue::{JobQueue, QueueError, QueuedJob};

/// Pending jobs re-enqueued per sweep.
const SWEEP_BATCH: i64 = 50;

/// Background consumer of the job queue.
pub struct Worker {
    manager: Arc<AnalysisManager>,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    /// Idle polls between sweeps of the job table
    sweep_every: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl Worker {
    pub fn new(
        manager: Arc<AnalysisManager>,
        queue: Arc<dyn JobQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            queue,
            poll_interval,
            sweep_every: 30,
        }
    }

    pub fn with_sweep_every(mut self, idle_polls: u32) -> Self {
        self.sweep_every = idle_polls.max(1);
        self
    }

    /// Handle the next queued job, if any. Returns whether one was dequeued.
    pub async fn process_next(&self) -> Result<bool, WorkerError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        let result = self.manager.process(job.job_id).await;
        // Ack either way; a job whose run did not finish is back in pending
        // and the sweep delivers it again.
        if let Err(e) = self.queue.complete(&job).await {
            tracing::warn!(job_id = %job.job_id, error = %e, "Failed to ack queued job");
        }

        match result? {
            ProcessOutcome::Skipped => {
                tracing::debug!(job_id = %job.job_id, "Dropped duplicate or stale delivery");
            }
            outcome => tracing::debug!(job_id = %job.job_id, ?outcome, "Job handled"),
        }
        Ok(true)
    }

    /// Re-enqueue pending jobs whose queue entry may have been lost.
    pub async fn sweep(&self) -> Result<usize, WorkerError> {
        let ids = self.manager.pending_job_ids(SWEEP_BATCH).await?;
        for id in &ids {
            self.queue.enqueue(&QueuedJob::new(*id)).await?;
        }
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Re-enqueued pending jobs");
        }
        Ok(ids.len())
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Worker started");
        let mut idle_polls: u32 = 0;

        while !*shutdown.borrow() {
            let wait = match self.process_next().await {
                Ok(true) => {
                    idle_polls = 0;
                    continue;
                }
                Ok(false) => {
                    idle_polls += 1;
                    if idle_polls >= self.sweep_every {
                        idle_polls = 0;
                        if let Err(e) = self.sweep().await {
                            tracing::error!(error = %e, "Pending job sweep failed");
                        }
                    }
                    if let Ok(depth) = self.queue.queue_depth().await {
                        metrics::gauge!("analysis_queue_depth").set(depth as f64);
                    }
                    self.poll_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error processing job, will retry");
                    self.poll_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("Worker stopped");
    }
}
