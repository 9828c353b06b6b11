//! Backend trait for the per-message distribution log.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogBackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored entry could not be read back
    #[error("Corrupt log entry '{id}': {reason}")]
    Corrupt { id: String, reason: String },

    /// Backend is temporarily unavailable (e.g., circuit breaker open)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogState {
    Received,
    Submitted,
    Rejected,
    Failed,
}

impl LogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogState::Received => "received",
            LogState::Submitted => "submitted",
            LogState::Rejected => "rejected",
            LogState::Failed => "failed",
        }
    }
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(LogState::Received),
            "submitted" => Ok(LogState::Submitted),
            "rejected" => Ok(LogState::Rejected),
            "failed" => Ok(LogState::Failed),
            other => Err(format!("unknown log state '{}'", other)),
        }
    }
}

/// What the service knows about one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionLogEntry {
    pub id: String,
    pub queue: String,
    pub message_type: String,
    pub state: LogState,
    /// Raw inbound message as received
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of a message being logged.
#[derive(Debug, Clone, Copy)]
pub struct LogKey<'a> {
    pub id: &'a str,
    pub queue: &'a str,
    pub message_type: &'a str,
}

#[async_trait]
pub trait DistributionLogBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Record a delivery of the message. Creates the entry on first sight,
    /// otherwise resets it to `received` and bumps `attempts`.
    async fn mark_received(
        &self,
        key: LogKey<'_>,
        data: &Value,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError>;

    /// Record the terminal state of the current attempt.
    async fn mark_state(
        &self,
        id: &str,
        state: LogState,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError>;

    async fn get(&self, id: &str) -> Result<Option<DistributionLogEntry>, LogBackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            LogState::Received,
            LogState::Submitted,
            LogState::Rejected,
            LogState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<LogState>(), Ok(state));
        }
        assert!("pending".parse::<LogState>().is_err());
    }
}
