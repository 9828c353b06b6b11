//! Shared Redis connection with circuit breaker integration.

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{CircuitBreaker, CircuitState, RedisHealth};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Multiplexed Redis connection shared by the stream trigger, job queue and log.
///
/// Blocking stream reads must use [`RedisPool::dedicated_connection`] so they
/// do not stall commands queued on the shared connection.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: Arc<CircuitBreaker>,
    health: Arc<RedisHealth>,
}

impl RedisPool {
    pub fn new(
        config: RedisConfig,
        circuit_breaker: Arc<CircuitBreaker>,
        health: Arc<RedisHealth>,
    ) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            circuit_breaker,
            health,
        })
    }

    /// Shared connection, established on first use.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        self.health.set_reconnecting();
        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *guard = Some(conn.clone());
                self.circuit_breaker.record_success();
                self.health.set_connected();
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// A fresh connection owned by the caller, for blocking reads.
    pub async fn dedicated_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                self.circuit_breaker.record_success();
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Run a command on the shared connection and record the outcome on the breaker.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    *self.connection.write().await = None;
                    self.health.set_reconnecting();
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.circuit_breaker.state() == CircuitState::Closed
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn health(&self) -> &Arc<RedisHealth> {
        &self.health
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Typed helpers for the commands the distribution runtime issues.
#[async_trait::async_trait]
pub trait RedisPoolExt {
    /// Create a consumer group (and the stream) unless it already exists.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PoolError>;

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> Result<String, PoolError>;

    /// Append every entry inside one MULTI/EXEC transaction.
    async fn xadd_atomic(
        &self,
        stream: &str,
        entries: &[Vec<(&str, String)>],
    ) -> Result<Vec<String>, PoolError>;

    async fn xack(&self, stream: &str, group: &str, ids: &[&str]) -> Result<i64, PoolError>;

    /// Pending entries of the group that have been idle for at least `min_idle_ms`.
    async fn xpending_idle(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        min_idle_ms: u64,
    ) -> Result<Vec<StreamPendingId>, PoolError>;

    async fn xclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[&str],
    ) -> Result<Vec<StreamId>, PoolError>;

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), PoolError>;

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, PoolError>;

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> Result<i64, PoolError>;

    async fn expire(&self, key: &str, seconds: i64) -> Result<(), PoolError>;
}

#[async_trait::async_trait]
impl RedisPoolExt for RedisPool {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), PoolError> {
        let result = self
            .execute(|mut conn| async move {
                conn.xgroup_create_mkstream::<_, _, _, ()>(stream, group, "0")
                    .await
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!(stream = %stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(PoolError::Redis(e)) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> Result<String, PoolError> {
        self.execute(|mut conn| async move { conn.xadd(stream, "*", fields).await })
            .await
    }

    async fn xadd_atomic(
        &self,
        stream: &str,
        entries: &[Vec<(&str, String)>],
    ) -> Result<Vec<String>, PoolError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for fields in entries {
            let cmd = pipe.cmd("XADD").arg(stream).arg("*");
            for (field, value) in fields {
                cmd.arg(*field).arg(value.as_str());
            }
        }

        self.execute(|mut conn| async move { pipe.query_async(&mut conn).await })
            .await
    }

    async fn xack(&self, stream: &str, group: &str, ids: &[&str]) -> Result<i64, PoolError> {
        self.execute(|mut conn| async move { conn.xack(stream, group, ids).await })
            .await
    }

    async fn xpending_idle(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        min_idle_ms: u64,
    ) -> Result<Vec<StreamPendingId>, PoolError> {
        let reply: StreamPendingCountReply = self
            .execute(|mut conn| async move {
                conn.xpending_count(stream, group, "-", "+", count).await
            })
            .await?;

        Ok(reply
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .collect())
    }

    async fn xclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[&str],
    ) -> Result<Vec<StreamId>, PoolError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let reply: StreamClaimReply = self
            .execute(|mut conn| async move {
                conn.xclaim(stream, group, consumer, min_idle_ms, ids).await
            })
            .await?;
        Ok(reply.ids)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), PoolError> {
        self.execute(|mut conn| async move { conn.hset_multiple::<_, _, _, ()>(key, fields).await })
            .await
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, PoolError> {
        self.execute(|mut conn| async move { conn.hgetall(key).await })
            .await
    }

    async fn hincrby(&self, key: &str, field: &str, increment: i64) -> Result<i64, PoolError> {
        self.execute(|mut conn| async move { conn.hincr(key, field, increment).await })
            .await
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<(), PoolError> {
        self.execute(|mut conn| async move { conn.expire::<_, ()>(key, seconds).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (RedisPool, Arc<CircuitBreaker>) {
        let cb = Arc::new(CircuitBreaker::new("redis-test"));
        let pool = RedisPool::new(
            RedisConfig::default(),
            cb.clone(),
            Arc::new(RedisHealth::new()),
        )
        .unwrap();
        (pool, cb)
    }

    #[test]
    fn test_pool_creation() {
        let (pool, _) = pool();
        assert_eq!(pool.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_before_connecting() {
        let (pool, cb) = pool();
        for _ in 0..5 {
            cb.record_failure();
        }

        assert!(!pool.is_healthy());
        assert!(matches!(pool.get_connection().await, Err(PoolError::CircuitOpen)));
        assert!(matches!(pool.dedicated_connection().await, Err(PoolError::CircuitOpen)));
    }

    #[test]
    fn test_invalid_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        let result = RedisPool::new(
            config,
            Arc::new(CircuitBreaker::new("redis-test")),
            Arc::new(RedisHealth::new()),
        );
        assert!(matches!(result, Err(PoolError::Redis(_))));
    }
}
