//! Outbox entry model: created on `publish_to_outbox`, mutated only through
//! storage's `mark_processed`/`update_retry_count`/`mark_failed`, never
//! deleted until a retention policy elects to clean it up.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub priority: u8,
    pub destination: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

/// Options accepted by `publish_to_outbox`. `priority` above the processor's
/// configured threshold signals the background worker to poll immediately
/// instead of waiting for the next scheduled tick. `destination` names the
/// downstream target (queue, topic, endpoint) the entry is ultimately bound
/// for; dispatch in this crate routes by `message_type` alone, so the field
/// is carried through for dispatchers that route on it.
#[derive(Debug, Clone)]
pub struct OutboxOptions {
    pub priority: u8,
    pub max_retries: u32,
    pub destination: Option<String>,
}

impl OutboxOptions {
    pub fn new(priority: u8, max_retries: u32) -> Self {
        Self { priority, max_retries, destination: None }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self { priority: 0, max_retries: 3, destination: None }
    }
}

impl OutboxEntry {
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value, options: &OutboxOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message_type.into(),
            payload,
            status: OutboxStatus::Pending,
            priority: options.priority,
            destination: options.destination.clone(),
            retry_count: 0,
            max_retries: options.max_retries,
            next_retry_at: None,
            created_at: Utc::now(),
            failure_reason: None,
        }
    }
}
