//! Recipient resolution from stored subscriptions or explicit message recipients

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::filter::evaluate_filters;
use super::message::DistributionMessage;
use super::types::{
    DistributionRule, InvalidRecipient, RecipientEntry, Subscription, SubscriptionData,
};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("recipients[{index}] is invalid: {reason}")]
    InvalidEntry {
        index: usize,
        reason: InvalidRecipient,
    },

    #[error("Subscription data source unavailable: {0}")]
    Unavailable(String),

    #[error("Subscription lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl ResolveError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ResolveError::InvalidEntry { .. })
    }
}

/// External lookup that turns recipient references into contact-bearing data
#[async_trait]
pub trait SubscriptionDataSource: Send + Sync {
    /// Map explicit recipient entries, preserving order.
    async fn resolve(&self, entries: &[RecipientEntry]) -> Result<Vec<SubscriptionData>, ResolveError> {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                SubscriptionData::try_from(entry)
                    .map_err(|reason| ResolveError::InvalidEntry { index, reason })
            })
            .collect()
    }

    /// Look up contact profiles for stored subscriptions, preserving order.
    async fn resolve_subscriptions(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<SubscriptionData>, ResolveError>;
}

/// Keep subscriptions whose filters accept the payload.
pub fn filter_subscriptions<'a>(
    subscriptions: &'a [Subscription],
    payload: &Value,
) -> Vec<&'a Subscription> {
    subscriptions
        .iter()
        .filter(|s| evaluate_filters(s.filter_join, &s.filters, payload))
        .collect()
}

/// Resolves the recipients for one message under the selected rule
#[derive(Clone)]
pub struct RecipientResolver {
    source: Arc<dyn SubscriptionDataSource>,
    lookup_timeout: Duration,
}

impl RecipientResolver {
    pub fn new(source: Arc<dyn SubscriptionDataSource>, lookup_timeout: Duration) -> Self {
        Self {
            source,
            lookup_timeout,
        }
    }

    pub async fn resolve(
        &self,
        rule: &DistributionRule,
        subscriptions: &[Subscription],
        message: &DistributionMessage,
    ) -> Result<Vec<SubscriptionData>, ResolveError> {
        if rule.bypass_subscriptions {
            return self.bounded(self.source.resolve(&message.recipients)).await;
        }

        let passing: Vec<Subscription> = filter_subscriptions(subscriptions, &message.payload)
            .into_iter()
            .cloned()
            .collect();

        tracing::debug!(
            message_id = %message.id,
            stored = subscriptions.len(),
            passing = passing.len(),
            "Filtered subscriptions"
        );

        if passing.is_empty() {
            return Ok(Vec::new());
        }

        self.bounded(self.source.resolve_subscriptions(&passing)).await
    }

    async fn bounded<F>(&self, lookup: F) -> Result<Vec<SubscriptionData>, ResolveError>
    where
        F: std::future::Future<Output = Result<Vec<SubscriptionData>, ResolveError>>,
    {
        tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| ResolveError::Timeout(self.lookup_timeout))?
    }
}
