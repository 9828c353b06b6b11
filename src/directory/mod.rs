//! Subscriber directory: maps a subscription's `subscriber_id` to a contact profile
//!
//! Both backends implement [`SubscriptionDataSource`]; explicit message
//! recipients use the trait's default mapping.

mod memory_backend;
mod postgres_backend;

use std::collections::HashMap;
use std::sync::Arc;

pub use memory_backend::MemoryDirectory;
pub use postgres_backend::PostgresDirectory;

use crate::distribution::{RecipientEntry, Subscription, SubscriptionData, SubscriptionDataSource};
use crate::postgres::PostgresPool;

/// Resolve subscriptions against loaded profiles, preserving subscription order.
///
/// Subscribers without a profile, or with a profile that has no usable
/// contact, are skipped.
pub(crate) fn assemble(
    subscriptions: &[Subscription],
    profiles: &HashMap<String, RecipientEntry>,
) -> Vec<SubscriptionData> {
    subscriptions
        .iter()
        .filter_map(|subscription| {
            let Some(profile) = profiles.get(&subscription.subscriber_id) else {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    subscriber_id = %subscription.subscriber_id,
                    "No contact profile for subscriber, skipping"
                );
                return None;
            };

            match SubscriptionData::try_from(profile) {
                Ok(data) => Some(data.restrict_to(subscription)),
                Err(e) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        subscriber_id = %subscription.subscriber_id,
                        error = %e,
                        "Invalid contact profile, skipping"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Pick the directory backing stored subscriptions.
///
/// PostgreSQL is used whenever a pool is configured.
pub fn create_directory(postgres_pool: Option<Arc<PostgresPool>>) -> Arc<dyn SubscriptionDataSource> {
    match postgres_pool {
        Some(pool) => {
            tracing::info!(backend = "postgres", "Creating PostgreSQL subscriber directory");
            Arc::new(PostgresDirectory::new(pool))
        }
        None => {
            tracing::info!(backend = "memory", "Creating memory subscriber directory");
            Arc::new(MemoryDirectory::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{DeliveryMethod, FilterJoin, GenericRecipientEntry};
    use uuid::Uuid;

    fn subscription(id: &str, subscriber_id: &str, methods: Vec<DeliveryMethod>) -> Subscription {
        Subscription {
            id: id.to_string(),
            distribution_event_id: Uuid::nil(),
            subscriber_id: subscriber_id.to_string(),
            delivery_methods: methods,
            filter_join: FilterJoin::And,
            filters: vec![],
        }
    }

    #[test]
    fn test_assemble_restricts_and_skips() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "user-1".to_string(),
            RecipientEntry::Generic(GenericRecipientEntry {
                email: Some("one@example.com".to_string()),
                phone: Some("+15550001".to_string()),
                time_zone: Some("Europe/Madrid".to_string()),
                ..Default::default()
            }),
        );
        profiles.insert(
            "broken".to_string(),
            RecipientEntry::Generic(GenericRecipientEntry::default()),
        );

        let resolved = assemble(
            &[
                subscription("s-1", "user-1", vec![DeliveryMethod::Sms]),
                subscription("s-2", "missing", vec![]),
                subscription("s-3", "broken", vec![]),
            ],
            &profiles,
        );

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].delivery_methods, vec![DeliveryMethod::Sms]);
        assert_eq!(resolved[0].subscriber_id.as_deref(), Some("user-1"));
        assert_eq!(resolved[0].delivery_method(DeliveryMethod::Email), None);
    }
}
