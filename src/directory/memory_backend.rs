use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::distribution::{
    RecipientEntry, ResolveError, Subscription, SubscriptionData, SubscriptionDataSource,
};

/// In-process subscriber profiles
#[derive(Default)]
pub struct MemoryDirectory {
    profiles: DashMap<String, RecipientEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscriber_id: impl Into<String>, profile: RecipientEntry) {
        self.profiles.insert(subscriber_id.into(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl SubscriptionDataSource for MemoryDirectory {
    async fn resolve_subscriptions(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<SubscriptionData>, ResolveError> {
        let profiles: HashMap<String, RecipientEntry> = subscriptions
            .iter()
            .filter_map(|s| {
                self.profiles
                    .get(&s.subscriber_id)
                    .map(|p| (s.subscriber_id.clone(), p.value().clone()))
            })
            .collect();

        Ok(super::assemble(subscriptions, &profiles))
    }
}
