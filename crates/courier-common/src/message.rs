//! The message envelope that flows through every processor and decorator.
//!
//! Mirrors FlowCatalyst's `Message` (the struct carried end-to-end through the
//! router), but generalized over an arbitrary payload type so the same envelope
//! shape works for commands, queries, and events.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stable, unique identifier for a message instance. Non-zero and immutable for
/// the lifetime of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A typed metadata value. Closed set rather than an opaque blob, so the metadata
/// map is usable without pulling in a serialization-format dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// Semantic version used to track compatibility of message schemas.
/// Compatibility is defined as matching `major`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl MessageVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn compatible_with(&self, other: &MessageVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for MessageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The envelope wrapping every command, query, and event as it flows through the
/// pipeline. The payload (`T`) is immutable through the pipeline; only the
/// processing context (carried alongside, not inside the envelope) accumulates
/// per-attempt metadata.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub metadata: Metadata,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: MessageId::new(),
            timestamp: Utc::now(),
            correlation_id: None,
            causation_id: None,
            metadata: Metadata::new(),
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Correlation id for tracing purposes, falling back to the message id when
    /// none was set explicitly.
    pub fn effective_correlation_id(&self) -> String {
        self.correlation_id.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Marker trait for command messages. A command expects at most one handler and
/// may return a response (`()` for fire-and-forget commands).
pub trait Command: Send + Sync + Clone + 'static {
    type Response: Send + Sync + 'static;

    fn type_name() -> &'static str;
}

/// Marker trait for query messages. A query expects exactly one handler that
/// always returns a response.
pub trait Query: Send + Sync + Clone + 'static {
    type Response: Send + Sync + 'static;

    fn type_name() -> &'static str;
}

/// Marker trait for event messages. An event is delivered to zero or more
/// handlers; it carries no response.
pub trait Event: Send + Sync + Clone + 'static {
    fn type_name() -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_unique_and_stable() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn envelope_falls_back_correlation_id_to_message_id() {
        let envelope = Envelope::new(42u32);
        assert_eq!(envelope.effective_correlation_id(), envelope.id.to_string());

        let envelope = envelope.with_correlation_id("corr-1");
        assert_eq!(envelope.effective_correlation_id(), "corr-1");
    }

    #[test]
    fn version_compatibility_is_major_only() {
        let a = MessageVersion::new(1, 2, 3);
        let b = MessageVersion::new(1, 9, 0);
        let c = MessageVersion::new(2, 0, 0);
        assert!(a.compatible_with(&b));
        assert!(!a.compatible_with(&c));
    }
}
