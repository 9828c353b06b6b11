// Infrastructure (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;

// Domain (distribution engine and its backends)
pub mod directory;
pub mod distribution;
pub mod distribution_log;
pub mod queue;
pub mod store;

// Application
pub mod api;
pub mod server;
pub mod triggers;

// Supporting modules
pub mod telemetry;
