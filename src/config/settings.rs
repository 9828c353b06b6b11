use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_delay_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Empty disables PostgreSQL
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

/// Inbound stream and consumer settings
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    /// Queue name used to look up distribution events
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Maximum concurrently processed entries per batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u64,
    #[serde(default = "default_reclaim_idle_ms")]
    pub reclaim_idle_ms: u64,
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_seconds: u64,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_submission_timeout")]
    pub submission_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// JSON file of distribution events loaded into the memory store
    #[serde(default)]
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// "redis" or "memory"; the memory queue is never drained outside tests
    #[serde(default = "default_redis_backend")]
    pub backend: String,
    #[serde(default = "default_jobs_stream")]
    pub stream: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_delay")]
    pub backoff_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "redis" or "memory"; memory entries never expire
    #[serde(default = "default_redis_backend")]
    pub backend: String,
    #[serde(default = "default_log_prefix")]
    pub redis_prefix: String,
    #[serde(default = "default_log_ttl")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_backoff_initial() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

fn default_queue() -> String {
    "distribution".to_string()
}

fn default_stream() -> String {
    "hermes:distribution".to_string()
}

fn default_consumer_group() -> String {
    "distribution".to_string()
}

fn default_consumer_name() -> String {
    env::var("HOSTNAME").unwrap_or_else(|_| "distribution-1".to_string())
}

fn default_dead_letter_stream() -> String {
    "hermes:distribution:dead-letter".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_block_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    4
}

fn default_max_deliveries() -> u64 {
    5
}

fn default_reclaim_idle_ms() -> u64 {
    60_000
}

fn default_reclaim_interval() -> u64 {
    30
}

fn default_lookup_timeout() -> u64 {
    5_000
}

fn default_submission_timeout() -> u64 {
    5_000
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

fn default_redis_backend() -> String {
    "redis".to_string()
}

fn default_jobs_stream() -> String {
    "hermes:notifications".to_string()
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_delay() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_log_prefix() -> String {
    "hermes:distribution-log".to_string()
}

fn default_log_ttl() -> u64 {
    7 * 24 * 60 * 60 // 1 week
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "hermes-distribution".to_string()
}

fn default_sample_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("redis.url", default_redis_url())?
            .set_default("distribution.queue", default_queue())?
            .set_default("store.backend", default_memory_backend())?
            .set_default("jobs.backend", default_redis_backend())?
            .set_default("log.backend", default_redis_backend())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // HERMES__SERVER__PORT, HERMES__DISTRIBUTION__CONSUMER_GROUP, ...
            .add_source(
                Environment::with_prefix("HERMES")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DistributionConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
            backoff_initial_delay_ms: default_backoff_initial(),
            backoff_max_delay_ms: default_backoff_max(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            stream: default_stream(),
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            dead_letter_stream: default_dead_letter_stream(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            concurrency: default_concurrency(),
            max_deliveries: default_max_deliveries(),
            reclaim_idle_ms: default_reclaim_idle_ms(),
            reclaim_interval_seconds: default_reclaim_interval(),
            lookup_timeout_ms: default_lookup_timeout(),
            submission_timeout_ms: default_submission_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            seed_file: None,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            backend: default_redis_backend(),
            stream: default_jobs_stream(),
            attempts: default_attempts(),
            backoff_delay_ms: default_backoff_delay(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_redis_backend(),
            redis_prefix: default_log_prefix(),
            ttl_seconds: default_log_ttl(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sample_ratio: default_sample_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let distribution = DistributionConfig::default();
        assert_eq!(distribution.queue, "distribution");
        assert_eq!(distribution.max_deliveries, 5);
        assert_eq!(distribution.lookup_timeout(), Duration::from_secs(5));

        let jobs = JobsConfig::default();
        assert_eq!(jobs.backend, "redis");
        assert_eq!(jobs.attempts, 3);

        let log = LogConfig::default();
        assert!(log.enabled);
        assert_eq!(log.backend, "redis");
        assert_eq!(log.ttl_seconds, 604_800);

        assert!(!OtelConfig::default().enabled);
        assert!(DatabaseConfig::default().url.is_empty());
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let settings: Settings = Config::builder()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("distribution.consumer_group", "fanout")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.distribution.consumer_group, "fanout");
        assert_eq!(settings.distribution.batch_size, 16);
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.jobs.backend, "redis");
        assert_eq!(settings.log.backend, "redis");
        assert_eq!(settings.server_addr(), "0.0.0.0:9000");
    }
}
