//! In-memory job queue used for local runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::distribution::NotificationJob;

use super::backend::{JobQueue, JobQueueError};

/// Jobs are appended under one lock, so a batch is never partially visible.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<NotificationJob>>,
    unavailable: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent submissions fail, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub async fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    pub async fn drain(&self) -> Vec<NotificationJob> {
        std::mem::take(&mut *self.jobs.lock().await)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn add_bulk(&self, jobs: &[NotificationJob]) -> Result<(), JobQueueError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(JobQueueError::Unavailable(
                "memory job queue marked unavailable".to_string(),
            ));
        }

        self.jobs.lock().await.extend_from_slice(jobs);
        Ok(())
    }
}
