//! PostgreSQL connectivity

mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
