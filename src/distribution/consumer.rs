//! Per-message distribution pipeline.
//!
//! One invocation takes a raw message through validation, rule selection,
//! recipient resolution and fan-out, then submits the batch in one call.
//! The result is always exactly one [`Outcome`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::distribution_log::{DistributionLogBackend, LogKey, LogState};
use crate::metrics::DistributionMetrics;
use crate::queue::JobQueue;
use crate::store::{DistributionEventStore, StoreError};

use super::clock::{Clock, SystemClock};
use super::error::{ConfigurationError, DistributionError, DistributionResult};
use super::fanout::create_notification_jobs;
use super::job::JobDefaults;
use super::message::{DistributionMessage, ValidationErrors};
use super::resolver::{RecipientResolver, ResolveError};
use super::selector::select_rule;

/// Terminal signal for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted { job_count: usize },
    /// Do not retry
    Rejected { reason: String },
    /// Retry later
    Failed { reason: String },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Submitted { .. } => "submitted",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Submitted { .. } => None,
            Outcome::Rejected { reason } | Outcome::Failed { reason } => Some(reason),
        }
    }

    fn log_state(&self) -> LogState {
        match self {
            Outcome::Submitted { .. } => LogState::Submitted,
            Outcome::Rejected { .. } => LogState::Rejected,
            Outcome::Failed { .. } => LogState::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Submitted { job_count } => write!(f, "submitted ({} jobs)", job_count),
            Outcome::Rejected { reason } => write!(f, "rejected: {}", reason),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

pub struct DistributionConsumer {
    queue: String,
    store: Arc<dyn DistributionEventStore>,
    resolver: RecipientResolver,
    jobs: Arc<dyn JobQueue>,
    log: Option<Arc<dyn DistributionLogBackend>>,
    clock: Arc<dyn Clock>,
    defaults: JobDefaults,
    submission_timeout: Duration,
}

impl DistributionConsumer {
    pub fn new(
        queue: impl Into<String>,
        store: Arc<dyn DistributionEventStore>,
        resolver: RecipientResolver,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            queue: queue.into(),
            store,
            resolver,
            jobs,
            log: None,
            clock: Arc::new(SystemClock),
            defaults: JobDefaults::default(),
            submission_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_log(mut self, log: Option<Arc<dyn DistributionLogBackend>>) -> Self {
        self.log = log;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_job_defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Distribute one raw inbound message.
    #[tracing::instrument(
        name = "distribution.handle",
        skip(self, raw),
        fields(queue = %self.queue, message_id, event_type)
    )]
    pub async fn handle_payload(&self, raw: &Value) -> Outcome {
        let started = Instant::now();
        DistributionMetrics::record_received();

        let message_id = raw_message_id(raw);
        let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default();
        let span = tracing::Span::current();
        if let Some(id) = &message_id {
            span.record("message_id", id.as_str());
        }
        span.record("event_type", event_type);

        if let Some(id) = &message_id {
            self.log_received(id, event_type, raw).await;
        }

        let outcome = match self.distribute(raw).await {
            Ok(job_count) => {
                tracing::info!(job_count, outcome = "submitted", "Message distributed");
                Outcome::Submitted { job_count }
            }
            Err(DistributionError::Validation(errors)) => {
                tracing::warn!(errors = %errors, outcome = "rejected", "Message failed validation");
                Outcome::Rejected {
                    reason: errors.to_string(),
                }
            }
            Err(DistributionError::Configuration(e)) => {
                tracing::error!(error = %e, outcome = "rejected", "Distribution configuration error");
                Outcome::Rejected {
                    reason: e.to_string(),
                }
            }
            Err(DistributionError::Transient(reason)) => {
                tracing::warn!(error = %reason, outcome = "failed", "Transient distribution failure");
                Outcome::Failed { reason }
            }
        };

        if let Some(id) = &message_id {
            self.log_outcome(id, &outcome).await;
        }
        DistributionMetrics::record_outcome(outcome.as_str(), started.elapsed());

        outcome
    }

    async fn distribute(&self, raw: &Value) -> DistributionResult<usize> {
        let message = DistributionMessage::from_value(raw)?;

        let event = self
            .store
            .find_one(&self.queue, &message.event_type)
            .await
            .map_err(store_error)?;

        let rule = select_rule(&event, &message.metadata)?;

        let subscriptions = self
            .resolver
            .resolve(rule, &event.subscriptions, &message)
            .await
            .map_err(resolve_error)?;

        if subscriptions.is_empty() {
            tracing::info!("No subscriptions resolved, nothing to deliver");
            return Ok(0);
        }

        let jobs = create_notification_jobs(
            rule,
            subscriptions,
            &message,
            &self.defaults,
            self.clock.now(),
        );

        if jobs.is_empty() {
            tracing::info!("No eligible recipients, nothing to deliver");
            return Ok(0);
        }

        match tokio::time::timeout(self.submission_timeout, self.jobs.add_bulk(&jobs)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(DistributionError::Transient(e.to_string())),
            Err(_) => {
                return Err(DistributionError::Transient(format!(
                    "job submission timed out after {:?}",
                    self.submission_timeout
                )))
            }
        }

        for job in &jobs {
            DistributionMetrics::record_job_submitted(job.name);
        }

        Ok(jobs.len())
    }

    async fn log_received(&self, id: &str, event_type: &str, raw: &Value) {
        let Some(log) = &self.log else { return };

        let key = LogKey {
            id,
            queue: &self.queue,
            message_type: event_type,
        };
        if let Err(e) = log.mark_received(key, raw, self.clock.now()).await {
            DistributionMetrics::record_log_error();
            tracing::warn!(error = %e, backend = log.backend_name(), "Failed to write distribution log");
        }
    }

    async fn log_outcome(&self, id: &str, outcome: &Outcome) {
        let Some(log) = &self.log else { return };

        if let Err(e) = log
            .mark_state(id, outcome.log_state(), outcome.reason(), self.clock.now())
            .await
        {
            DistributionMetrics::record_log_error();
            tracing::warn!(error = %e, backend = log.backend_name(), "Failed to write distribution log");
        }
    }
}

/// Best-effort id of a message that may not pass validation.
fn raw_message_id(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn store_error(err: StoreError) -> DistributionError {
    match err {
        StoreError::NotFound { queue, event_type } => {
            ConfigurationError::EventNotFound { queue, event_type }.into()
        }
        StoreError::Configuration(e) => e.into(),
        StoreError::InvalidData(reason) => ConfigurationError::InvalidRule(reason).into(),
        e @ (StoreError::Postgres(_) | StoreError::Unavailable(_)) => {
            DistributionError::Transient(e.to_string())
        }
    }
}

fn resolve_error(err: ResolveError) -> DistributionError {
    match err {
        ResolveError::InvalidEntry { index, reason } => {
            ValidationErrors::single(format!("recipients[{}]", index), reason.to_string()).into()
        }
        e => DistributionError::Transient(e.to_string()),
    }
}
