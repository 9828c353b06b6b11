//! Prometheus metrics for the distribution service.
//!
//! - Distribution metrics (messages received, outcomes, jobs per channel, latency)
//! - Stream runtime metrics (dead-lettered and reclaimed entries)
//! - Connection metrics (Redis connectivity, circuit breaker state)
//! - Distribution log backend errors

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, DistributionMetrics, StreamMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "hermes";

lazy_static! {
    // ============================================================================
    // Distribution Metrics
    // ============================================================================

    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_distribution_messages_received_total", METRIC_PREFIX),
        "Total distribution messages received"
    ).unwrap();

    /// Terminal outcomes by kind (submitted, rejected, failed)
    pub static ref MESSAGES_OUTCOME_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_distribution_outcomes_total", METRIC_PREFIX),
        "Distribution outcomes by kind",
        &["outcome"]
    ).unwrap();

    pub static ref JOBS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_distribution_jobs_submitted_total", METRIC_PREFIX),
        "Notification jobs submitted by channel",
        &["channel"]
    ).unwrap();

    /// Time from message receipt to terminal outcome
    pub static ref DISTRIBUTION_LATENCY: Histogram = register_histogram!(
        format!("{}_distribution_latency_seconds", METRIC_PREFIX),
        "Distribution processing latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    pub static ref LOG_BACKEND_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_distribution_log_errors_total", METRIC_PREFIX),
        "Distribution log writes that failed"
    ).unwrap();

    // ============================================================================
    // Stream Metrics
    // ============================================================================

    pub static ref DEAD_LETTERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stream_dead_lettered_total", METRIC_PREFIX),
        "Stream entries moved to the dead-letter stream"
    ).unwrap();

    pub static ref RECLAIMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stream_reclaimed_total", METRIC_PREFIX),
        "Idle pending stream entries claimed for reprocessing"
    ).unwrap();

    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// 1 when connected, 0 otherwise
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// 0=closed, 1=open, 2=half-open
    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_circuit_breaker_state", METRIC_PREFIX),
        "Circuit breaker state per dependency (0=closed, 1=open, 2=half-open)",
        &["breaker"]
    ).unwrap();
}
