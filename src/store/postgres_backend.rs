//! PostgreSQL distribution event store.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE distribution_events (
//!     id UUID PRIMARY KEY,
//!     queue TEXT NOT NULL,
//!     event_type TEXT NOT NULL,
//!     metadata_labels JSONB NOT NULL DEFAULT '[]',
//!     UNIQUE (queue, event_type)
//! );
//!
//! CREATE TABLE distribution_rules (
//!     id UUID PRIMARY KEY,
//!     distribution_event_id UUID NOT NULL REFERENCES distribution_events(id),
//!     position INT NOT NULL,
//!     metadata JSONB,
//!     delivery_methods TEXT[] NOT NULL,
//!     email_subject TEXT, email_template TEXT, html TEXT, text TEXT,
//!     sms_template TEXT, call_template TEXT, push_template TEXT, webhook_template TEXT,
//!     check_delivery_window BOOLEAN NOT NULL DEFAULT FALSE,
//!     bypass_subscriptions BOOLEAN NOT NULL DEFAULT FALSE
//! );
//!
//! CREATE TABLE subscriptions (
//!     id TEXT PRIMARY KEY,
//!     distribution_event_id UUID NOT NULL REFERENCES distribution_events(id),
//!     subscriber_id TEXT NOT NULL,
//!     delivery_methods TEXT[] NOT NULL DEFAULT '{}',
//!     filter_join TEXT NOT NULL DEFAULT 'AND',
//!     filters JSONB NOT NULL DEFAULT '[]'
//! );
//! ```

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::distribution::{
    DeliveryMethod, DistributionEvent, DistributionRule, FilterExpr, FilterJoin, Subscription,
};
use crate::postgres::PostgresPool;

use super::backend::{DistributionEventStore, StoreError};

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    queue: String,
    event_type: String,
    metadata_labels: Json<Vec<String>>,
}

#[derive(Debug, FromRow)]
struct RuleRow {
    distribution_event_id: Uuid,
    metadata: Option<Json<Map<String, Value>>>,
    delivery_methods: Vec<String>,
    email_subject: Option<String>,
    email_template: Option<String>,
    html: Option<String>,
    text: Option<String>,
    sms_template: Option<String>,
    call_template: Option<String>,
    push_template: Option<String>,
    webhook_template: Option<String>,
    check_delivery_window: bool,
    bypass_subscriptions: bool,
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: String,
    distribution_event_id: Uuid,
    subscriber_id: String,
    delivery_methods: Vec<String>,
    filter_join: String,
    filters: Json<Vec<FilterExpr>>,
}

fn parse_methods(methods: &[String]) -> Result<Vec<DeliveryMethod>, StoreError> {
    methods
        .iter()
        .map(|m| DeliveryMethod::from_str(m).map_err(StoreError::from))
        .collect()
}

impl TryFrom<RuleRow> for DistributionRule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            distribution_event_id: row.distribution_event_id,
            metadata: row.metadata.map(|Json(selector)| selector),
            delivery_methods: parse_methods(&row.delivery_methods)?,
            email_subject: row.email_subject,
            email_template: row.email_template,
            html: row.html,
            text: row.text,
            sms_template: row.sms_template,
            call_template: row.call_template,
            push_template: row.push_template,
            webhook_template: row.webhook_template,
            check_delivery_window: row.check_delivery_window,
            bypass_subscriptions: row.bypass_subscriptions,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let filter_join = match row.filter_join.to_ascii_uppercase().as_str() {
            "AND" => FilterJoin::And,
            "OR" => FilterJoin::Or,
            other => {
                return Err(StoreError::InvalidData(format!(
                    "subscription {} has unknown filter join '{}'",
                    row.id, other
                )))
            }
        };

        Ok(Self {
            delivery_methods: parse_methods(&row.delivery_methods)?,
            id: row.id,
            distribution_event_id: row.distribution_event_id,
            subscriber_id: row.subscriber_id,
            filter_join,
            filters: row.filters.0,
        })
    }
}

pub struct PostgresEventStore {
    pool: Arc<PostgresPool>,
}

impl PostgresEventStore {
    pub fn new(pool: Arc<PostgresPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributionEventStore for PostgresEventStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_one(&self, queue: &str, event_type: &str) -> Result<DistributionEvent, StoreError> {
        let event: Option<EventRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as::<_, EventRow>(
                    "SELECT id, queue, event_type, metadata_labels
                     FROM distribution_events
                     WHERE queue = $1 AND event_type = $2",
                )
                .bind(queue)
                .bind(event_type)
                .fetch_optional(&pool)
                .await
            })
            .await?;

        let Some(event) = event else {
            return Err(StoreError::NotFound {
                queue: queue.to_string(),
                event_type: event_type.to_string(),
            });
        };

        let event_id = event.id;

        let rules: Vec<RuleRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as::<_, RuleRow>(
                    "SELECT distribution_event_id, metadata, delivery_methods, email_subject,
                            email_template, html, text, sms_template, call_template,
                            push_template, webhook_template, check_delivery_window,
                            bypass_subscriptions
                     FROM distribution_rules
                     WHERE distribution_event_id = $1
                     ORDER BY position ASC",
                )
                .bind(event_id)
                .fetch_all(&pool)
                .await
            })
            .await?;

        let subscriptions: Vec<SubscriptionRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as::<_, SubscriptionRow>(
                    "SELECT id, distribution_event_id, subscriber_id, delivery_methods,
                            filter_join, filters
                     FROM subscriptions
                     WHERE distribution_event_id = $1
                     ORDER BY id ASC",
                )
                .bind(event_id)
                .fetch_all(&pool)
                .await
            })
            .await?;

        let event = DistributionEvent {
            id: event.id,
            queue: event.queue,
            event_type: event.event_type,
            metadata_labels: event.metadata_labels.0,
            rules: rules
                .into_iter()
                .map(DistributionRule::try_from)
                .collect::<Result<_, _>>()?,
            subscriptions: subscriptions
                .into_iter()
                .map(Subscription::try_from)
                .collect::<Result<_, _>>()?,
        };

        event.validate()?;

        tracing::debug!(
            queue = %queue,
            event_type = %event_type,
            rules = event.rules.len(),
            subscriptions = event.subscriptions.len(),
            "Loaded distribution event from PostgreSQL"
        );

        Ok(event)
    }
}
