//! In-memory distribution event store.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::distribution::DistributionEvent;

use super::backend::{DistributionEventStore, StoreError};

/// Events keyed by (queue, event type), optionally seeded from a JSON file
#[derive(Default)]
pub struct MemoryEventStore {
    events: DashMap<(String, String), DistributionEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<DistributionEvent>) -> Result<Self, StoreError> {
        let store = Self::new();
        for event in events {
            store.insert(event)?;
        }
        Ok(store)
    }

    /// Load a JSON array of distribution events.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("cannot read {}: {}", path.display(), e))
        })?;
        let events: Vec<DistributionEvent> = serde_json::from_str(&raw).map_err(|e| {
            StoreError::InvalidData(format!("cannot parse {}: {}", path.display(), e))
        })?;

        let store = Self::with_events(events)?;
        tracing::info!(
            path = %path.display(),
            events = store.len(),
            "Seeded memory event store"
        );
        Ok(store)
    }

    /// Insert or replace an event after checking its rules.
    pub fn insert(&self, mut event: DistributionEvent) -> Result<(), StoreError> {
        event.validate()?;

        for rule in &mut event.rules {
            rule.distribution_event_id = event.id;
        }
        for subscription in &mut event.subscriptions {
            subscription.distribution_event_id = event.id;
        }

        self.events
            .insert((event.queue.clone(), event.event_type.clone()), event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl DistributionEventStore for MemoryEventStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_one(&self, queue: &str, event_type: &str) -> Result<DistributionEvent, StoreError> {
        self.events
            .get(&(queue.to_string(), event_type.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                queue: queue.to_string(),
                event_type: event_type.to_string(),
            })
    }
}
