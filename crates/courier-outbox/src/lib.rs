//! Transactional outbox: durably append messages for later, at-least-once
//! delivery via a background worker that retries with backoff.

pub mod dispatcher;
pub mod entry;
pub mod processor;
pub mod storage;

pub use dispatcher::OutboxDispatcher;
pub use entry::{OutboxEntry, OutboxOptions, OutboxStatus};
pub use processor::{OutboxProcessor, OutboxProcessorConfig};
pub use storage::{InMemoryOutboxStorage, OutboxStorage};
