//! Redis Streams job queue.
//!
//! Each job becomes one stream entry with `name`, `jobId` and `data` (the
//! JSON-encoded job) fields. A batch is written in one MULTI/EXEC block.

use std::sync::Arc;

use async_trait::async_trait;

use crate::distribution::NotificationJob;
use crate::redis::{PoolError, RedisPool, RedisPoolExt};

use super::backend::{JobQueue, JobQueueError};

pub struct RedisJobQueue {
    pool: Arc<RedisPool>,
    stream: String,
}

impl RedisJobQueue {
    pub fn new(pool: Arc<RedisPool>, stream: String) -> Self {
        Self { pool, stream }
    }

    fn map_error(err: PoolError) -> JobQueueError {
        match err {
            PoolError::Redis(e) => JobQueueError::Redis(e),
            PoolError::CircuitOpen => {
                JobQueueError::Unavailable("Circuit breaker is open".to_string())
            }
            PoolError::ConnectionUnavailable(msg) => JobQueueError::Unavailable(msg),
        }
    }
}

/// Stream fields for one job
pub(crate) fn entry_fields(job: &NotificationJob) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
    Ok(vec![
        ("name", job.name.as_str().to_string()),
        ("jobId", job.opts.job_id.clone()),
        ("data", serde_json::to_string(job)?),
    ])
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn add_bulk(&self, jobs: &[NotificationJob]) -> Result<(), JobQueueError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let entries = jobs
            .iter()
            .map(entry_fields)
            .collect::<Result<Vec<_>, _>>()?;

        let ids = self
            .pool
            .xadd_atomic(&self.stream, &entries)
            .await
            .map_err(Self::map_error)?;

        tracing::debug!(
            stream = %self.stream,
            job_count = ids.len(),
            "Notification jobs appended to Redis stream"
        );

        Ok(())
    }
}
