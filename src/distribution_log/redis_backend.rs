//! Redis distribution log.
//!
//! One hash per message at `{prefix}:{message_id}`, expiring `ttl_seconds`
//! after the last write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::redis::{PoolError, RedisPool, RedisPoolExt};

use super::backend::{DistributionLogBackend, DistributionLogEntry, LogBackendError, LogKey, LogState};

pub struct RedisLogBackend {
    pool: Arc<RedisPool>,
    prefix: String,
    ttl_seconds: i64,
}

impl RedisLogBackend {
    pub fn new(pool: Arc<RedisPool>, prefix: String, ttl_seconds: u64) -> Self {
        Self {
            pool,
            prefix,
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
        }
    }

    fn entry_key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    fn map_error(err: PoolError) -> LogBackendError {
        match err {
            PoolError::Redis(e) => LogBackendError::Redis(e),
            PoolError::CircuitOpen => {
                LogBackendError::Unavailable("Circuit breaker is open".to_string())
            }
            PoolError::ConnectionUnavailable(msg) => LogBackendError::Unavailable(msg),
        }
    }
}

fn parse_entry(id: &str, fields: Vec<(String, String)>) -> Result<DistributionLogEntry, LogBackendError> {
    let mut fields: HashMap<String, String> = fields.into_iter().collect();
    let corrupt = |reason: String| LogBackendError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| corrupt(format!("missing field '{}'", name)))
    };

    let queue = take("queue")?;
    let message_type = take("messageType")?;
    let state = take("state")?.parse::<LogState>().map_err(corrupt)?;
    let data: Value = serde_json::from_str(&take("data")?)?;
    let attempts = take("attempts")?
        .parse::<u32>()
        .map_err(|e| corrupt(format!("attempts: {}", e)))?;
    let created_at = parse_time(&take("createdAt")?).map_err(corrupt)?;
    let updated_at = parse_time(&take("updatedAt")?).map_err(corrupt)?;
    let reason = fields.remove("reason").filter(|r| !r.is_empty());

    Ok(DistributionLogEntry {
        id: id.to_string(),
        queue,
        message_type,
        state,
        data,
        reason,
        attempts,
        created_at,
        updated_at,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{}': {}", raw, e))
}

#[async_trait]
impl DistributionLogBackend for RedisLogBackend {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn mark_received(
        &self,
        key: LogKey<'_>,
        data: &Value,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError> {
        let entry_key = self.entry_key(key.id);
        let attempts = self
            .pool
            .hincrby(&entry_key, "attempts", 1)
            .await
            .map_err(Self::map_error)?;

        let now = at.to_rfc3339();
        let mut fields = vec![
            ("queue", key.queue.to_string()),
            ("messageType", key.message_type.to_string()),
            ("state", LogState::Received.as_str().to_string()),
            ("data", serde_json::to_string(data)?),
            ("reason", String::new()),
            ("updatedAt", now.clone()),
        ];
        if attempts == 1 {
            fields.push(("createdAt", now));
        }

        self.pool
            .hset_multiple(&entry_key, &fields)
            .await
            .map_err(Self::map_error)?;
        self.pool
            .expire(&entry_key, self.ttl_seconds)
            .await
            .map_err(Self::map_error)
    }

    async fn mark_state(
        &self,
        id: &str,
        state: LogState,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError> {
        let entry_key = self.entry_key(id);

        // HINCRBY by 0 reads attempts; 0 means the entry does not exist
        let attempts = self
            .pool
            .hincrby(&entry_key, "attempts", 0)
            .await
            .map_err(Self::map_error)?;
        if attempts == 0 {
            return Ok(());
        }

        let fields = [
            ("state", state.as_str().to_string()),
            ("reason", reason.unwrap_or_default().to_string()),
            ("updatedAt", at.to_rfc3339()),
        ];
        self.pool
            .hset_multiple(&entry_key, &fields)
            .await
            .map_err(Self::map_error)?;
        self.pool
            .expire(&entry_key, self.ttl_seconds)
            .await
            .map_err(Self::map_error)
    }

    async fn get(&self, id: &str) -> Result<Option<DistributionLogEntry>, LogBackendError> {
        let fields = self
            .pool
            .hgetall(&self.entry_key(id))
            .await
            .map_err(Self::map_error)?;

        if fields.is_empty() {
            return Ok(None);
        }
        parse_entry(id, fields).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::redis::{CircuitBreaker, RedisHealth};
    use serde_json::json;

    fn stored(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = [
            ("queue", "distribution"),
            ("messageType", "order.shipped"),
            ("state", "submitted"),
            ("data", r#"{"id":"m-1"}"#),
            ("attempts", "2"),
            ("createdAt", "2024-03-04T14:00:00+00:00"),
            ("updatedAt", "2024-03-04T14:00:30+00:00"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        fields.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        fields
    }

    #[test]
    fn test_parse_entry() {
        let entry = parse_entry("m-1", stored(&[("reason", "")])).unwrap();
        assert_eq!(entry.state, LogState::Submitted);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.data, json!({ "id": "m-1" }));
        assert_eq!(entry.reason, None);
        assert!(entry.updated_at > entry.created_at);
    }

    #[test]
    fn test_parse_entry_keeps_reason() {
        let entry = parse_entry("m-1", stored(&[("reason", "no default rule")])).unwrap();
        assert_eq!(entry.reason.as_deref(), Some("no default rule"));
    }

    #[test]
    fn test_parse_entry_missing_field_is_corrupt() {
        let mut fields = stored(&[]);
        fields.retain(|(k, _)| k != "state");
        let err = parse_entry("m-1", fields).unwrap_err();
        assert!(matches!(err, LogBackendError::Corrupt { .. }));
    }

    #[test]
    fn test_entry_key() {
        let pool = Arc::new(
            RedisPool::new(
                RedisConfig::default(),
                Arc::new(CircuitBreaker::new("redis-test")),
                Arc::new(RedisHealth::new()),
            )
            .unwrap(),
        );
        let backend = RedisLogBackend::new(pool, "hermes:distribution-log".to_string(), 60);
        assert_eq!(backend.entry_key("m-1"), "hermes:distribution-log:m-1");
    }
}
