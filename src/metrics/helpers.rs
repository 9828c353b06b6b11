//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::distribution::DeliveryMethod;
use crate::redis::CircuitState;

use super::{
    CIRCUIT_BREAKER_STATE, DEAD_LETTERED_TOTAL, DISTRIBUTION_LATENCY, JOBS_SUBMITTED_TOTAL,
    LOG_BACKEND_ERRORS_TOTAL, MESSAGES_OUTCOME_TOTAL, MESSAGES_RECEIVED_TOTAL, RECLAIMED_TOTAL,
    REDIS_CONNECTION_STATUS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct DistributionMetrics;

impl DistributionMetrics {
    pub fn record_received() {
        MESSAGES_RECEIVED_TOTAL.inc();
    }

    pub fn record_outcome(outcome: &str, elapsed: Duration) {
        MESSAGES_OUTCOME_TOTAL.with_label_values(&[outcome]).inc();
        DISTRIBUTION_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn record_job_submitted(channel: DeliveryMethod) {
        JOBS_SUBMITTED_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    pub fn record_log_error() {
        LOG_BACKEND_ERRORS_TOTAL.inc();
    }
}

pub struct StreamMetrics;

impl StreamMetrics {
    pub fn record_dead_lettered() {
        DEAD_LETTERED_TOTAL.inc();
    }

    pub fn record_reclaimed(count: u64) {
        RECLAIMED_TOTAL.inc_by(count);
    }
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_redis_connected(connected: bool) {
        REDIS_CONNECTION_STATUS.set(i64::from(connected));
    }

    pub fn set_circuit_state(breaker: &str, state: CircuitState) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[breaker])
            .set(state as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        DistributionMetrics::record_received();
        DistributionMetrics::record_outcome("submitted", Duration::from_millis(3));
        DistributionMetrics::record_job_submitted(DeliveryMethod::Email);
        ConnectionMetrics::set_circuit_state("redis", CircuitState::Open);

        let text = encode_metrics().unwrap();
        assert!(text.contains("hermes_distribution_messages_received_total"));
        assert!(text.contains("hermes_distribution_outcomes_total{outcome=\"submitted\"}"));
        assert!(text.contains("hermes_distribution_jobs_submitted_total{channel=\"email\"}"));
        assert!(text.contains("hermes_circuit_breaker_state{breaker=\"redis\"} 1"));
    }
}
