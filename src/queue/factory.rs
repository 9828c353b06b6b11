//! Job queue factory

use std::sync::Arc;

use crate::config::JobsConfig;
use crate::redis::RedisPool;

use super::backend::JobQueue;
use super::memory_backend::MemoryJobQueue;
use super::redis_backend::RedisJobQueue;

/// Create the job queue selected by `jobs.backend`.
///
/// - `"redis"` (default): [`RedisJobQueue`] writing to `jobs.stream`, if a Redis pool is provided
/// - `"memory"`: [`MemoryJobQueue`], for tests and local runs
pub fn create_job_queue(
    settings: &JobsConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn JobQueue> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    stream = %settings.stream,
                    "Creating Redis job queue"
                );
                Arc::new(RedisJobQueue::new(pool, settings.stream.clone()))
            } else {
                tracing::warn!("Redis job queue requested but no pool provided, falling back to memory");
                Arc::new(MemoryJobQueue::new())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory job queue");
            Arc::new(MemoryJobQueue::new())
        }
        other => {
            tracing::warn!(backend = %other, "Unknown job queue backend, falling back to memory");
            Arc::new(MemoryJobQueue::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_memory_backend() {
        let settings = JobsConfig {
            backend: "memory".to_string(),
            ..Default::default()
        };
        assert_eq!(create_job_queue(&settings, None).backend_name(), "memory");
    }

    #[test]
    fn test_redis_without_pool_falls_back() {
        let settings = JobsConfig {
            backend: "redis".to_string(),
            ..Default::default()
        };
        assert_eq!(create_job_queue(&settings, None).backend_name(), "memory");
    }

    #[test]
    fn test_unknown_backend_falls_back() {
        let settings = JobsConfig {
            backend: "kafka".to_string(),
            ..Default::default()
        };
        assert_eq!(create_job_queue(&settings, None).backend_name(), "memory");
    }
}
