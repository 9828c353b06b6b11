//! API layer - HTTP endpoint handlers.

mod logs;
mod metrics;
mod routes;

pub use logs::get_distribution_log;
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
