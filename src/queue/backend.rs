//! Backend trait for the outbound notification job queue.

use async_trait::async_trait;
use thiserror::Error;

use crate::distribution::NotificationJob;

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable (e.g., circuit breaker open)
    #[error("Job queue unavailable: {0}")]
    Unavailable(String),
}

/// Downstream work queue consumed by the channel senders.
///
/// `add_bulk` is all-or-nothing: either every job in the batch is enqueued
/// or none is.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn add_bulk(&self, jobs: &[NotificationJob]) -> Result<(), JobQueueError>;
}
