use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use super::backend::{DistributionLogBackend, DistributionLogEntry, LogBackendError, LogKey, LogState};

/// In-process distribution log. Entries live until the process exits.
#[derive(Default)]
pub struct MemoryLogBackend {
    entries: DashMap<String, DistributionLogEntry>,
}

impl MemoryLogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DistributionLogBackend for MemoryLogBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn mark_received(
        &self,
        key: LogKey<'_>,
        data: &Value,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError> {
        self.entries
            .entry(key.id.to_string())
            .and_modify(|entry| {
                entry.state = LogState::Received;
                entry.data = data.clone();
                entry.reason = None;
                entry.attempts += 1;
                entry.updated_at = at;
            })
            .or_insert_with(|| DistributionLogEntry {
                id: key.id.to_string(),
                queue: key.queue.to_string(),
                message_type: key.message_type.to_string(),
                state: LogState::Received,
                data: data.clone(),
                reason: None,
                attempts: 1,
                created_at: at,
                updated_at: at,
            });
        Ok(())
    }

    async fn mark_state(
        &self,
        id: &str,
        state: LogState,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), LogBackendError> {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.state = state;
            entry.reason = reason.map(str::to_string);
            entry.updated_at = at;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DistributionLogEntry>, LogBackendError> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }
}
