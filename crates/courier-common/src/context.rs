//! Processing context carried alongside a message through the decorator pipeline.

use chrono::{DateTime, Utc};

use crate::message::Metadata;

/// Per-invocation state threaded through the pipeline. Created fresh at the top
/// level of a `process` call; each retry produces an updated context with an
/// incremented `retry_count` and a preserved `first_failure_time`.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub component: String,
    pub retry_count: u32,
    pub first_failure_time: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl ProcessingContext {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            retry_count: 0,
            first_failure_time: None,
            metadata: Metadata::new(),
        }
    }

    /// Record a failure, setting `first_failure_time` only if this is the first
    /// one observed in this attempt chain.
    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        if self.first_failure_time.is_none() {
            self.first_failure_time = Some(at);
        }
    }

    /// Advance to the next retry attempt. `first_failure_time` is never touched
    /// here; call `record_failure` before incrementing.
    pub fn next_attempt(&mut self) {
        self.retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_time_is_set_once_and_preserved() {
        let mut ctx = ProcessingContext::new("test");
        let t1 = Utc::now();
        ctx.record_failure(t1);
        ctx.next_attempt();
        let t2 = t1 + chrono::Duration::seconds(5);
        ctx.record_failure(t2);
        assert_eq!(ctx.first_failure_time, Some(t1));
        assert_eq!(ctx.retry_count, 1);
    }
}
