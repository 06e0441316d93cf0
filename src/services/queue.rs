use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

const QUEUE_KEY: &str = "gym_assets:analysis_jobs";
const PROCESSING_KEY: &str = "gym_assets:analysis_processing";

/// Queue payload. The job row is authoritative, so only the id travels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: Uuid,
}

impl QueuedJob {
    pub fn new(job_id: Uuid) -> Self {
        Self { job_id }
    }
}

/// Delivery channel from the job manager to background workers.
///
/// Delivery is at-least-once; workers claim jobs with a compare-and-set so
/// duplicates are dropped.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Non-blocking; `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledge a dequeued job.
    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError>;

    async fn queue_depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis list queue; dequeued payloads sit in a processing list until acked.
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// FIFO queue shared by the server and its embedded workers.
#[derive(Default)]
pub struct MemoryJobQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.pending.lock().await.push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        Ok(self.pending.lock().await.pop_front())
    }

    async fn complete(&self, _job: &QueuedJob) -> Result<(), QueueError> {
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, QueueError> {
        Ok(self.pending.lock().await.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        let first = QueuedJob::new(Uuid::new_v4());
        let second = QueuedJob::new(Uuid::new_v4());

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        assert_eq!(queue.queue_depth().await.unwrap(), 2);

        assert_eq!(queue.dequeue().await.unwrap(), Some(first));
        assert_eq!(queue.dequeue().await.unwrap(), Some(second));
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }

    #[test]
    fn test_payload_carries_only_the_id() {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(QueuedJob::new(id)).unwrap();
        assert_eq!(payload, serde_json::json!({ "job_id": id }));
    }
}
