//! PostgreSQL subscriber directory.
//!
//! ```sql
//! CREATE TABLE subscriber_profiles (
//!     subscriber_id TEXT PRIMARY KEY,
//!     profile JSONB NOT NULL
//! );
//! ```
//!
//! `profile` holds a recipient entry: either a device (`subscription`,
//! `platform`) or a generic contact (`email`, `phone`, `webhookUrl`,
//! `timeZone`, `deliveryMethods`, `deliveryWindows`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

use crate::distribution::{
    RecipientEntry, ResolveError, Subscription, SubscriptionData, SubscriptionDataSource,
};
use crate::postgres::PostgresPool;

#[derive(Debug, FromRow)]
struct ProfileRow {
    subscriber_id: String,
    profile: Json<Value>,
}

pub struct PostgresDirectory {
    pool: Arc<PostgresPool>,
}

impl PostgresDirectory {
    pub fn new(pool: Arc<PostgresPool>) -> Self {
        Self { pool }
    }
}

fn parse_profiles(rows: Vec<ProfileRow>) -> HashMap<String, RecipientEntry> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<RecipientEntry>(row.profile.0) {
            Ok(entry) => Some((row.subscriber_id, entry)),
            Err(e) => {
                tracing::warn!(
                    subscriber_id = %row.subscriber_id,
                    error = %e,
                    "Unreadable subscriber profile"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl SubscriptionDataSource for PostgresDirectory {
    async fn resolve_subscriptions(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<SubscriptionData>, ResolveError> {
        let ids: Vec<String> = subscriptions
            .iter()
            .map(|s| s.subscriber_id.clone())
            .collect();

        let rows: Vec<ProfileRow> = self
            .pool
            .execute_with_circuit_breaker(|pool| async move {
                sqlx::query_as::<_, ProfileRow>(
                    "SELECT subscriber_id, profile
                     FROM subscriber_profiles
                     WHERE subscriber_id = ANY($1)",
                )
                .bind(&ids)
                .fetch_all(&pool)
                .await
            })
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        Ok(super::assemble(subscriptions, &parse_profiles(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_profiles_skips_unreadable() {
        let rows = vec![
            ProfileRow {
                subscriber_id: "user-1".to_string(),
                profile: Json(json!({ "email": "one@example.com", "timeZone": "Europe/Madrid" })),
            },
            ProfileRow {
                subscriber_id: "user-2".to_string(),
                profile: Json(json!("not an object")),
            },
        ];

        let profiles = parse_profiles(rows);
        assert_eq!(profiles.len(), 1);
        assert!(matches!(profiles.get("user-1"), Some(RecipientEntry::Generic(_))));
    }
}
