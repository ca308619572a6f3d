//! Storage contract for inbox entries, plus an in-memory reference
//! implementation. Concrete SQL/Mongo-backed storage remains out of scope.

use chrono::Utc;
use courier_common::CourierError;
use dashmap::DashMap;
use uuid::Uuid;

use crate::entry::{InboxEntry, InboxStatus};

#[async_trait::async_trait]
pub trait InboxStorage: Send + Sync {
    /// Whether a message with this id was received within `window`.
    async fn is_duplicate(&self, message_id: &str, window: std::time::Duration) -> Result<bool, CourierError>;

    /// Adds `entry`, returning `None` if storage itself rejects the entry as
    /// a duplicate (idempotent insert) rather than raising an error.
    async fn add(&self, entry: InboxEntry) -> Result<Option<Uuid>, CourierError>;

    async fn get_unprocessed(&self, batch_size: usize) -> Result<Vec<InboxEntry>, CourierError>;
    async fn mark_processed(&self, id: Uuid) -> Result<(), CourierError>;
    async fn get_unprocessed_count(&self) -> Result<usize, CourierError>;
    async fn cleanup_old_entries(&self, retention: std::time::Duration) -> Result<usize, CourierError>;
}

#[derive(Default)]
pub struct InMemoryInboxStorage {
    entries: DashMap<Uuid, InboxEntry>,
    by_message_id: DashMap<String, Uuid>,
}

impl InMemoryInboxStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InboxStorage for InMemoryInboxStorage {
    async fn is_duplicate(&self, message_id: &str, window: std::time::Duration) -> Result<bool, CourierError> {
        let Some(existing_id) = self.by_message_id.get(message_id).map(|e| *e) else {
            return Ok(false);
        };
        let Some(entry) = self.entries.get(&existing_id) else {
            return Ok(false);
        };
        let age = Utc::now() - entry.received_at;
        Ok(age <= chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero()))
    }

    async fn add(&self, entry: InboxEntry) -> Result<Option<Uuid>, CourierError> {
        if self.by_message_id.contains_key(&entry.message_id) {
            return Ok(None);
        }
        let id = entry.id;
        self.by_message_id.insert(entry.message_id.clone(), id);
        self.entries.insert(id, entry);
        Ok(Some(id))
    }

    async fn get_unprocessed(&self, batch_size: usize) -> Result<Vec<InboxEntry>, CourierError> {
        let mut unprocessed: Vec<InboxEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == InboxStatus::Pending)
            .map(|e| e.value().clone())
            .collect();
        unprocessed.sort_by_key(|e| e.received_at);
        unprocessed.truncate(batch_size);
        Ok(unprocessed)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), CourierError> {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.status = InboxStatus::Processed;
        }
        Ok(())
    }

    async fn get_unprocessed_count(&self) -> Result<usize, CourierError> {
        Ok(self.entries.iter().filter(|e| e.status == InboxStatus::Pending).count())
    }

    async fn cleanup_old_entries(&self, retention: std::time::Duration) -> Result<usize, CourierError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        let stale: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| e.received_at < cutoff)
            .map(|e| *e.key())
            .collect();

        for id in &stale {
            if let Some((_, entry)) = self.entries.remove(id) {
                self.by_message_id.remove(&entry.message_id);
            }
        }
        Ok(stale.len())
    }
}
