//! Backend trait for distribution event storage.

use async_trait::async_trait;
use thiserror::Error;

use crate::distribution::{ConfigurationError, DistributionEvent};
use crate::postgres::PostgresPoolError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Distribution Event queue={queue} eventType={event_type} not found")]
    NotFound { queue: String, event_type: String },

    /// Stored configuration violates a rule invariant
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] PostgresPoolError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Backend outages are retryable, bad or missing configuration is not
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Postgres(_) | StoreError::Unavailable(_))
    }
}

/// Read access to registered distribution events.
///
/// Implementations must be `Send + Sync`; one handle is shared by every
/// concurrent consumer invocation.
#[async_trait]
pub trait DistributionEventStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Find an event by (queue, event type) with its rules in declaration
    /// order and its stored subscriptions attached.
    async fn find_one(&self, queue: &str, event_type: &str) -> Result<DistributionEvent, StoreError>;
}
