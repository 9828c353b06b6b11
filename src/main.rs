use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use hermes_distribution::config::{DatabaseConfig, Settings};
use hermes_distribution::directory::create_directory;
use hermes_distribution::distribution::{DistributionConsumer, JobDefaults, RecipientResolver};
use hermes_distribution::distribution_log::create_log_backend;
use hermes_distribution::postgres::PostgresPool;
use hermes_distribution::queue::create_job_queue;
use hermes_distribution::redis::{
    BackoffConfig, CircuitBreaker, CircuitBreakerConfig, RedisHealth, RedisPool,
};
use hermes_distribution::server::{create_app, AppState};
use hermes_distribution::store::create_event_store;
use hermes_distribution::telemetry::init_telemetry;
use hermes_distribution::triggers::{RedisStreamTrigger, StreamConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let redis_pool = Arc::new(RedisPool::new(
        settings.redis.clone(),
        Arc::new(CircuitBreaker::with_config(
            "redis",
            CircuitBreakerConfig::from(&settings.redis),
        )),
        Arc::new(RedisHealth::new()),
    )?);
    if let Err(e) = redis_pool.ping().await {
        tracing::warn!(error = %e, "Redis not reachable at startup, stream trigger will retry");
    }

    let postgres_pool = connect_postgres(&settings).await?;

    let event_store = create_event_store(&settings.store, postgres_pool.clone())?;
    let directory = create_directory(postgres_pool.clone());
    let job_queue = create_job_queue(&settings.jobs, Some(redis_pool.clone()));
    if job_queue.backend_name() == "memory" {
        tracing::warn!("Jobs are kept in process memory and never reach a delivery worker");
    }
    let distribution_log = create_log_backend(&settings.log, Some(redis_pool.clone()));

    let consumer = Arc::new(
        DistributionConsumer::new(
            settings.distribution.queue.clone(),
            event_store,
            RecipientResolver::new(directory, settings.distribution.lookup_timeout()),
            job_queue,
        )
        .with_log(distribution_log.clone())
        .with_job_defaults(JobDefaults {
            attempts: settings.jobs.attempts,
            backoff_delay_ms: settings.jobs.backoff_delay_ms,
        })
        .with_submission_timeout(settings.distribution.submission_timeout()),
    );
    tracing::info!(queue = %consumer.queue(), "Distribution consumer initialized");

    let trigger = Arc::new(RedisStreamTrigger::new(
        redis_pool,
        consumer,
        StreamConfig::from(&settings.distribution),
        BackoffConfig::from(&settings.redis),
    ));
    let shutdown_signal = trigger.shutdown_signal();

    let trigger_task = trigger.clone();
    let trigger_handle = tokio::spawn(async move {
        if let Err(e) = trigger_task.start().await {
            tracing::error!(error = %e, "Redis stream trigger failed");
        }
    });

    let state = AppState {
        settings: Arc::new(settings.clone()),
        distribution_log,
    };
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_signal))
        .await?;

    tracing::info!("Waiting for stream trigger to finish...");
    let _ = trigger_handle.await;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Connect when `database.url` is set. A configured database that cannot be
/// reached is fatal.
async fn connect_postgres(settings: &Settings) -> Result<Option<Arc<PostgresPool>>> {
    let config: &DatabaseConfig = &settings.database;
    if config.url.is_empty() {
        tracing::info!("No database configured, using in-memory store and directory");
        return Ok(None);
    }

    let breaker = Arc::new(CircuitBreaker::with_config(
        "postgres",
        CircuitBreakerConfig::from(&settings.redis),
    ));
    let pool = PostgresPool::connect(config, breaker).await?;
    Ok(Some(Arc::new(pool)))
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
