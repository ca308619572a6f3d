//! Inbox entry model: created on first receipt, marked processed on first
//! successful handler run. Cleanup removes entries older than a configured
//! retention window.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxStatus {
    Pending,
    Processed,
}

#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub id: Uuid,
    pub message_id: String,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub status: InboxStatus,
    pub received_at: DateTime<Utc>,
}

/// Options accepted by `process_incoming`. `require_idempotency` gates a
/// `storage.is_duplicate` check against `deduplication_window` before the
/// message is added.
#[derive(Debug, Clone)]
pub struct InboxOptions {
    pub require_idempotency: bool,
    pub deduplication_window: std::time::Duration,
}

impl Default for InboxOptions {
    fn default() -> Self {
        Self { require_idempotency: true, deduplication_window: std::time::Duration::from_secs(3600) }
    }
}

impl InboxEntry {
    pub fn new(message_id: impl Into<String>, message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: message_id.into(),
            message_type: message_type.into(),
            payload,
            status: InboxStatus::Pending,
            received_at: Utc::now(),
        }
    }
}
