//! Redis Streams consumer-group trigger.
//!
//! Reads inbound messages with `XREADGROUP`, runs each through the
//! [`DistributionConsumer`] and settles the entry from the outcome:
//!
//! - `submitted`: `XACK`
//! - `rejected`: copied to the dead-letter stream with the reason, then `XACK`
//! - `failed`: left pending; the reclaim pass re-runs it once idle, and
//!   dead-letters it after `max_deliveries` attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::DistributionConfig;
use crate::distribution::{DistributionConsumer, Outcome};
use crate::metrics::StreamMetrics;
use crate::redis::{BackoffConfig, ExponentialBackoff, PoolError, RedisPool, RedisPoolExt};

/// Consumer-group settings for the inbound stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub dead_letter_stream: String,
    pub batch_size: usize,
    pub block_ms: usize,
    pub concurrency: usize,
    pub max_deliveries: u64,
    pub reclaim_idle_ms: u64,
    pub reclaim_interval: Duration,
}

impl From<&DistributionConfig> for StreamConfig {
    fn from(config: &DistributionConfig) -> Self {
        Self {
            stream: config.stream.clone(),
            group: config.consumer_group.clone(),
            consumer: config.consumer_name.clone(),
            dead_letter_stream: config.dead_letter_stream.clone(),
            batch_size: config.batch_size.max(1),
            block_ms: usize::try_from(config.block_ms).unwrap_or(usize::MAX),
            concurrency: config.concurrency.max(1),
            max_deliveries: config.max_deliveries.max(1),
            reclaim_idle_ms: config.reclaim_idle_ms,
            reclaim_interval: Duration::from_secs(config.reclaim_interval_seconds.max(1)),
        }
    }
}

/// What to do with a stream entry after one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    DeadLetter,
    Retry,
}

/// Decide the fate of an entry delivered `deliveries` times.
pub fn settle(outcome: &Outcome, deliveries: u64, max_deliveries: u64) -> Settlement {
    match outcome {
        Outcome::Submitted { .. } => Settlement::Ack,
        Outcome::Rejected { .. } => Settlement::DeadLetter,
        Outcome::Failed { .. } if deliveries >= max_deliveries => Settlement::DeadLetter,
        Outcome::Failed { .. } => Settlement::Retry,
    }
}

/// What the reclaim pass does with a claimed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaim {
    DeadLetter,
    /// Run again; the claim counts as one more delivery
    Process { deliveries: u64 },
}

/// Decide the fate of a claimed entry already delivered `previous_deliveries` times.
pub fn reclaim_action(previous_deliveries: u64, max_deliveries: u64) -> Reclaim {
    if previous_deliveries >= max_deliveries {
        Reclaim::DeadLetter
    } else {
        Reclaim::Process {
            deliveries: previous_deliveries + 1,
        }
    }
}

/// Reclaim runs between reads, never while a blocking read is in flight.
#[derive(Debug)]
pub struct ReclaimSchedule {
    interval: Duration,
    next: Instant,
}

impl ReclaimSchedule {
    /// First pass is due immediately.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now,
        }
    }

    /// True when a pass is due; schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

/// Stream side effects of settling an entry
#[async_trait]
pub trait EntrySettler: Send + Sync {
    /// Returns false when the entry could not be acknowledged.
    async fn ack(&self, id: &str) -> bool;

    /// Copy the entry to the dead-letter stream. Returns false if the copy failed.
    async fn dead_letter(&self, entry: &StreamId, reason: &str) -> bool;
}

/// Apply a settlement. Returns true when the entry left the pending list.
///
/// A dead-letter copy that fails leaves the entry pending.
pub async fn apply_settlement<S: EntrySettler + ?Sized>(
    settler: &S,
    entry: &StreamId,
    settlement: Settlement,
    reason: &str,
) -> bool {
    match settlement {
        Settlement::Ack => settler.ack(&entry.id).await,
        Settlement::DeadLetter => {
            settler.dead_letter(entry, reason).await && settler.ack(&entry.id).await
        }
        Settlement::Retry => false,
    }
}

pub struct RedisStreamTrigger {
    pool: Arc<RedisPool>,
    consumer: Arc<DistributionConsumer>,
    config: StreamConfig,
    backoff: BackoffConfig,
    shutdown: broadcast::Sender<()>,
}

impl RedisStreamTrigger {
    pub fn new(
        pool: Arc<RedisPool>,
        consumer: Arc<DistributionConsumer>,
        config: StreamConfig,
        backoff: BackoffConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            pool,
            consumer,
            config,
            backoff,
            shutdown,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run until a shutdown signal arrives, reconnecting on errors.
    pub async fn start(&self) -> anyhow::Result<()> {
        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            "Starting Redis stream trigger"
        );

        let mut backoff = ExponentialBackoff::new(self.backoff.clone());
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            match self.run_read_loop(&mut backoff).await {
                Ok(()) => {
                    tracing::info!("Redis stream trigger stopped gracefully");
                    break;
                }
                Err(e) => {
                    self.pool.health().set_reconnecting();
                    let delay = backoff.next_delay();
                    let circuit = self.pool.circuit_breaker().stats();
                    tracing::error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        circuit = circuit.state.as_str(),
                        circuit_failures = circuit.failure_count,
                        "Redis stream error, reconnecting"
                    );

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::info!("Received shutdown signal while reconnecting");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        Ok(())
    }

    async fn run_read_loop(&self, backoff: &mut ExponentialBackoff) -> anyhow::Result<()> {
        self.pool
            .ensure_group(&self.config.stream, &self.config.group)
            .await?;
        let mut conn = self.pool.dedicated_connection().await?;

        backoff.reset();
        self.pool.health().set_connected();
        tracing::info!(
            stream = %self.config.stream,
            total_reconnections = self.pool.health().stats().total_reconnections,
            "Redis stream consumer established"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut schedule = ReclaimSchedule::new(self.config.reclaim_interval, Instant::now());

        loop {
            if schedule.poll(Instant::now()) {
                if let Err(e) = self.reclaim().await {
                    tracing::warn!(error = %e, "Reclaim pass failed");
                }
            }

            let reply = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }
                reply = self.read_batch(&mut conn) => reply,
            };

            let entries = match reply {
                Ok(entries) => {
                    self.pool.circuit_breaker().record_success();
                    entries
                }
                Err(e) => {
                    self.pool.circuit_breaker().record_failure();
                    return Err(e.into());
                }
            };

            futures::stream::iter(entries.iter())
                .for_each_concurrent(self.config.concurrency, |entry| self.process_entry(entry, 1))
                .await;
        }
    }

    async fn read_batch(&self, conn: &mut MultiplexedConnection) -> redis::RedisResult<Vec<StreamId>> {
        let options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.batch_size)
            .block(self.config.block_ms);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream], &[">"], &options)
            .await?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    /// Claim entries idle past `reclaim_idle_ms` and re-run or dead-letter them.
    async fn reclaim(&self) -> Result<(), PoolError> {
        let pending = self
            .pool
            .xpending_idle(
                &self.config.stream,
                &self.config.group,
                self.config.batch_size,
                self.config.reclaim_idle_ms,
            )
            .await?;

        if pending.is_empty() {
            return Ok(());
        }

        let delivered: HashMap<&str, u64> = pending
            .iter()
            .map(|p| (p.id.as_str(), p.times_delivered as u64))
            .collect();
        let ids: Vec<&str> = delivered.keys().copied().collect();

        let claimed = self
            .pool
            .xclaim(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer,
                self.config.reclaim_idle_ms,
                &ids,
            )
            .await?;

        if claimed.is_empty() {
            return Ok(());
        }
        StreamMetrics::record_reclaimed(claimed.len() as u64);
        tracing::info!(count = claimed.len(), "Reclaimed idle stream entries");

        futures::stream::iter(claimed.iter())
            .for_each_concurrent(self.config.concurrency, |entry| {
                let previous = delivered.get(entry.id.as_str()).copied().unwrap_or(0);
                async move {
                    match reclaim_action(previous, self.config.max_deliveries) {
                        Reclaim::DeadLetter => {
                            let reason = format!("exceeded {} deliveries", self.config.max_deliveries);
                            apply_settlement(self, entry, Settlement::DeadLetter, &reason).await;
                        }
                        Reclaim::Process { deliveries } => self.process_entry(entry, deliveries).await,
                    }
                }
            })
            .await;

        Ok(())
    }

    #[tracing::instrument(
        name = "stream.process_entry",
        skip(self, entry),
        fields(entry_id = %entry.id)
    )]
    async fn process_entry(&self, entry: &StreamId, deliveries: u64) {
        let outcome = match entry.get::<String>("data") {
            Some(data) => match serde_json::from_str::<Value>(&data) {
                Ok(raw) => self.consumer.handle_payload(&raw).await,
                Err(e) => Outcome::Rejected {
                    reason: format!("data is not valid JSON: {}", e),
                },
            },
            None => Outcome::Rejected {
                reason: "entry has no data field".to_string(),
            },
        };

        let settlement = settle(&outcome, deliveries, self.config.max_deliveries);
        if settlement == Settlement::Retry {
            tracing::debug!(
                deliveries,
                max_deliveries = self.config.max_deliveries,
                "Leaving entry pending for retry"
            );
        }
        let reason = outcome.reason().unwrap_or("dead-lettered");
        apply_settlement(self, entry, settlement, reason).await;
    }
}

#[async_trait]
impl EntrySettler for RedisStreamTrigger {
    async fn ack(&self, id: &str) -> bool {
        match self
            .pool
            .xack(&self.config.stream, &self.config.group, &[id])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(entry_id = %id, error = %e, "Failed to acknowledge stream entry");
                false
            }
        }
    }

    async fn dead_letter(&self, entry: &StreamId, reason: &str) -> bool {
        let data = entry.get::<String>("data").unwrap_or_default();
        let fields = [
            ("data", data.as_str()),
            ("reason", reason),
            ("originalId", entry.id.as_str()),
            ("stream", self.config.stream.as_str()),
        ];

        match self
            .pool
            .xadd(&self.config.dead_letter_stream, &fields)
            .await
        {
            Ok(dead_letter_id) => {
                StreamMetrics::record_dead_lettered();
                tracing::warn!(
                    entry_id = %entry.id,
                    dead_letter_id = %dead_letter_id,
                    reason = %reason,
                    "Stream entry dead-lettered"
                );
                true
            }
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Failed to dead-letter stream entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records stream side effects; the dead-letter copy can be made to fail.
    struct RecordingSettler {
        dead_letter_ok: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSettler {
        fn new(dead_letter_ok: bool) -> Self {
            Self {
                dead_letter_ok,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EntrySettler for RecordingSettler {
        async fn ack(&self, id: &str) -> bool {
            self.calls.lock().unwrap().push(format!("ack {}", id));
            true
        }

        async fn dead_letter(&self, entry: &StreamId, reason: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("dead-letter {} ({})", entry.id, reason));
            self.dead_letter_ok
        }
    }

    fn entry(id: &str) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: HashMap::new(),
        }
    }

    fn failed() -> Outcome {
        Outcome::Failed {
            reason: "job queue unavailable".to_string(),
        }
    }

    #[test]
    fn test_submitted_is_acked() {
        assert_eq!(settle(&Outcome::Submitted { job_count: 0 }, 1, 5), Settlement::Ack);
    }

    #[test]
    fn test_rejected_is_dead_lettered_on_first_delivery() {
        let outcome = Outcome::Rejected {
            reason: "no default rule".to_string(),
        };
        assert_eq!(settle(&outcome, 1, 5), Settlement::DeadLetter);
    }

    #[test]
    fn test_failed_retries_until_max_deliveries() {
        assert_eq!(settle(&failed(), 1, 3), Settlement::Retry);
        assert_eq!(settle(&failed(), 2, 3), Settlement::Retry);
        assert_eq!(settle(&failed(), 3, 3), Settlement::DeadLetter);
        assert_eq!(settle(&failed(), 7, 3), Settlement::DeadLetter);
    }

    #[test]
    fn test_stream_config_from_settings() {
        let settings = DistributionConfig {
            concurrency: 0,
            reclaim_interval_seconds: 0,
            ..DistributionConfig::default()
        };
        let config = StreamConfig::from(&settings);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.reclaim_interval, Duration::from_secs(1));
        assert_eq!(config.group, "distribution");
        assert_eq!(config.dead_letter_stream, "hermes:distribution:dead-letter");
    }

    #[test]
    fn test_reclaim_action_by_previous_deliveries() {
        assert_eq!(reclaim_action(1, 3), Reclaim::Process { deliveries: 2 });
        assert_eq!(reclaim_action(2, 3), Reclaim::Process { deliveries: 3 });
        assert_eq!(reclaim_action(3, 3), Reclaim::DeadLetter);
        assert_eq!(reclaim_action(9, 3), Reclaim::DeadLetter);
    }

    #[tokio::test]
    async fn test_max_deliveries_dead_letters_then_acks() {
        let settler = RecordingSettler::new(true);
        let settlement = match reclaim_action(5, 5) {
            Reclaim::DeadLetter => Settlement::DeadLetter,
            Reclaim::Process { .. } => panic!("entry should not be re-run"),
        };

        let settled = apply_settlement(&settler, &entry("1-0"), settlement, "exceeded 5 deliveries").await;

        assert!(settled);
        assert_eq!(
            settler.calls(),
            vec!["dead-letter 1-0 (exceeded 5 deliveries)", "ack 1-0"]
        );
    }

    #[tokio::test]
    async fn test_failed_dead_letter_keeps_entry_pending() {
        let settler = RecordingSettler::new(false);

        let settled =
            apply_settlement(&settler, &entry("2-0"), Settlement::DeadLetter, "exceeded 5 deliveries").await;

        assert!(!settled);
        assert_eq!(settler.calls(), vec!["dead-letter 2-0 (exceeded 5 deliveries)"]);
    }

    #[tokio::test]
    async fn test_retry_and_ack_settlements() {
        let settler = RecordingSettler::new(true);

        assert!(!apply_settlement(&settler, &entry("3-0"), Settlement::Retry, "busy").await);
        assert!(settler.calls().is_empty());

        assert!(apply_settlement(&settler, &entry("3-0"), Settlement::Ack, "").await);
        assert_eq!(settler.calls(), vec!["ack 3-0"]);
    }

    #[test]
    fn test_reclaim_schedule_runs_between_reads() {
        let start = Instant::now();
        let mut schedule = ReclaimSchedule::new(Duration::from_secs(30), start);

        assert!(schedule.poll(start));
        assert!(!schedule.poll(start + Duration::from_secs(5)));
        assert!(!schedule.poll(start + Duration::from_secs(29)));
        assert!(schedule.poll(start + Duration::from_secs(31)));
        assert!(!schedule.poll(start + Duration::from_secs(36)));
    }
}
