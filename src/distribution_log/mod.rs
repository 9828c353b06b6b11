//! Per-message distribution log.
//!
//! Tracks each inbound message through `received` and its terminal state so
//! operators can see what happened to a given message id.

mod backend;
mod memory_backend;
mod redis_backend;

use std::sync::Arc;

use crate::config::LogConfig;
use crate::redis::RedisPool;

pub use backend::{DistributionLogBackend, DistributionLogEntry, LogBackendError, LogKey, LogState};
pub use memory_backend::MemoryLogBackend;
pub use redis_backend::RedisLogBackend;

/// Create the log backend selected by `log.backend`, or `None` when the log
/// is disabled.
pub fn create_log_backend(
    settings: &LogConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Option<Arc<dyn DistributionLogBackend>> {
    if !settings.enabled {
        tracing::info!("Distribution log disabled");
        return None;
    }

    match (settings.backend.as_str(), redis_pool) {
        ("redis", Some(pool)) => {
            tracing::info!(
                backend = "redis",
                prefix = %settings.redis_prefix,
                ttl_seconds = settings.ttl_seconds,
                "Creating Redis distribution log"
            );
            Some(Arc::new(RedisLogBackend::new(
                pool,
                settings.redis_prefix.clone(),
                settings.ttl_seconds,
            )))
        }
        ("redis", None) => {
            tracing::warn!("Redis distribution log requested but no pool provided, falling back to memory");
            Some(Arc::new(MemoryLogBackend::new()))
        }
        (backend, _) => {
            if backend != "memory" {
                tracing::warn!(backend = %backend, "Unknown distribution log backend, falling back to memory");
            }
            tracing::info!(backend = "memory", "Creating memory distribution log");
            Some(Arc::new(MemoryLogBackend::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_log_has_no_backend() {
        let settings = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(create_log_backend(&settings, None).is_none());
    }

    #[test]
    fn test_redis_without_pool_falls_back() {
        let settings = LogConfig {
            backend: "redis".to_string(),
            ..LogConfig::default()
        };
        let backend = create_log_backend(&settings, None).unwrap();
        assert_eq!(backend.backend_name(), "memory");
    }
}
