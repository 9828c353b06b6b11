//! Outbound notification job queue.
//!
//! Distribution produces one job per (channel, contact) pair and hands the
//! whole batch to a [`JobQueue`] in a single call.

mod backend;
mod factory;
mod memory_backend;
mod redis_backend;

pub use backend::{JobQueue, JobQueueError};
pub use factory::create_job_queue;
pub use memory_backend::MemoryJobQueue;
pub use redis_backend::RedisJobQueue;
