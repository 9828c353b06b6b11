//! Event store factory

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::postgres::PostgresPool;

use super::backend::{DistributionEventStore, StoreError};
use super::memory_backend::MemoryEventStore;
use super::postgres_backend::PostgresEventStore;

/// Create the event store selected by `store.backend`.
///
/// - `"postgres"`: [`PostgresEventStore`], falling back to memory without a pool
/// - `"memory"` (default): [`MemoryEventStore`], seeded from `store.seed_file` when set
///
/// A missing or invalid seed file is an error.
pub fn create_event_store(
    settings: &StoreConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Result<Arc<dyn DistributionEventStore>, StoreError> {
    if settings.backend == "postgres" {
        if let Some(pool) = postgres_pool {
            tracing::info!(backend = "postgres", "Creating PostgreSQL event store");
            return Ok(Arc::new(PostgresEventStore::new(pool)));
        }
        tracing::warn!("PostgreSQL event store requested but no pool provided, falling back to memory");
    }

    let store = match &settings.seed_file {
        Some(path) => MemoryEventStore::from_seed_file(path)?,
        None => MemoryEventStore::new(),
    };
    if store.is_empty() {
        tracing::warn!("Memory event store is empty, every message will be rejected");
    }
    tracing::info!(backend = "memory", events = store.len(), "Creating memory event store");

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_memory() {
        let store = create_event_store(&StoreConfig::default(), None).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let settings = StoreConfig {
            backend: "postgres".to_string(),
            seed_file: None,
        };
        let store = create_event_store(&settings, None).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[test]
    fn test_missing_seed_file_is_error() {
        let settings = StoreConfig {
            backend: "memory".to_string(),
            seed_file: Some("/nonexistent/hermes-seed.json".to_string()),
        };
        assert!(create_event_store(&settings, None).is_err());
    }
}
