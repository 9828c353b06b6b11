//! Distribution event storage
//!
//! Rules and stored subscriptions are read-only to the engine; CRUD happens
//! elsewhere.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{DistributionEventStore, StoreError};
pub use factory::create_event_store;
pub use memory_backend::MemoryEventStore;
pub use postgres_backend::PostgresEventStore;
