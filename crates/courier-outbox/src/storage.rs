//! Storage contract for outbox entries, plus an in-memory reference
//! implementation sufficient to exercise the background worker, priority
//! polling, and retry/backoff behavior without a real database. Concrete
//! SQL/Mongo-backed storage remains out of scope.

use chrono::{DateTime, Utc};
use courier_common::CourierError;
use dashmap::DashMap;
use uuid::Uuid;

use crate::entry::{OutboxEntry, OutboxStatus};

#[async_trait::async_trait]
pub trait OutboxStorage: Send + Sync {
    async fn append(&self, entry: OutboxEntry) -> Result<(), CourierError>;

    /// Up to `batch_size` entries with `status = Pending` and
    /// `next_retry_at` either unset or due, ordered by priority desc then
    /// `created_at` asc.
    async fn get_pending(&self, batch_size: usize) -> Result<Vec<OutboxEntry>, CourierError>;

    async fn mark_processed(&self, id: Uuid) -> Result<(), CourierError>;
    async fn update_retry_count(&self, id: Uuid, retry_count: u32, next_retry_at: DateTime<Utc>) -> Result<(), CourierError>;
    async fn mark_failed(&self, id: Uuid, reason: String) -> Result<(), CourierError>;
    async fn pending_count(&self) -> Result<usize, CourierError>;
}

#[derive(Default)]
pub struct InMemoryOutboxStorage {
    entries: DashMap<Uuid, OutboxEntry>,
}

impl InMemoryOutboxStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OutboxStorage for InMemoryOutboxStorage {
    async fn append(&self, entry: OutboxEntry) -> Result<(), CourierError> {
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get_pending(&self, batch_size: usize) -> Result<Vec<OutboxEntry>, CourierError> {
        let now = Utc::now();
        let mut pending: Vec<OutboxEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && e.next_retry_at.map(|t| t <= now).unwrap_or(true))
            .map(|e| e.value().clone())
            .collect();

        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        pending.truncate(batch_size);
        Ok(pending)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), CourierError> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.status = OutboxStatus::Processed;
        }
        Ok(())
    }

    async fn update_retry_count(&self, id: Uuid, retry_count: u32, next_retry_at: DateTime<Utc>) -> Result<(), CourierError> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.retry_count = retry_count;
            entry.next_retry_at = Some(next_retry_at);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, reason: String) -> Result<(), CourierError> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.status = OutboxStatus::Failed;
            entry.failure_reason = Some(reason);
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, CourierError> {
        Ok(self.entries.iter().filter(|e| e.status == OutboxStatus::Pending).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::OutboxOptions;

    #[tokio::test]
    async fn get_pending_orders_by_priority_then_created_at() {
        let storage = InMemoryOutboxStorage::new();
        let low = OutboxEntry::new("Low", serde_json::json!({}), &OutboxOptions { priority: 1, ..Default::default() });
        let high = OutboxEntry::new("High", serde_json::json!({}), &OutboxOptions { priority: 9, ..Default::default() });
        storage.append(low.clone()).await.unwrap();
        storage.append(high.clone()).await.unwrap();

        let pending = storage.get_pending(10).await.unwrap();
        assert_eq!(pending[0].id, high.id);
        assert_eq!(pending[1].id, low.id);
    }

    #[tokio::test]
    async fn mark_processed_removes_entry_from_pending() {
        let storage = InMemoryOutboxStorage::new();
        let entry = OutboxEntry::new("Foo", serde_json::json!({}), &OutboxOptions::default());
        storage.append(entry.clone()).await.unwrap();
        storage.mark_processed(entry.id).await.unwrap();

        assert_eq!(storage.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn entries_with_future_retry_time_are_excluded_from_pending() {
        let storage = InMemoryOutboxStorage::new();
        let entry = OutboxEntry::new("Foo", serde_json::json!({}), &OutboxOptions::default());
        storage.append(entry.clone()).await.unwrap();
        storage
            .update_retry_count(entry.id, 1, Utc::now() + chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert!(storage.get_pending(10).await.unwrap().is_empty());
    }
}
