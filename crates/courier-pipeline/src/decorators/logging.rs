//! Logging decorator: debug on entry, configured level on success, warning on
//! a result-level failure, error + rethrow on an exception.

use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use courier_common::{Envelope, ProcessingContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Level};

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct LoggingDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    type_name: &'static str,
    success_level: Level,
    log_payload: bool,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> LoggingDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, type_name: &'static str) -> Self {
        Self { inner, type_name, success_level: Level::DEBUG, log_payload: false, _marker: PhantomData }
    }

    pub fn with_success_level(mut self, level: Level) -> Self {
        self.success_level = level;
        self
    }

    /// Enable Trace-level payload logging. Still guarded at the call site by
    /// the logger's own trace-enabled check, so this flag alone does not
    /// force a payload to be serialized on every call.
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payload = enabled;
        self
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for LoggingDecorator<M, R>
where
    M: std::fmt::Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn process(
        &self,
        envelope: &Envelope<M>,
        context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<R> {
        debug!(message_id = %envelope.id, type_name = self.type_name, "processing message");

        if self.log_payload && tracing::enabled!(Level::TRACE) {
            tracing::trace!(message_id = %envelope.id, payload = ?envelope.payload, "message payload");
        }

        let started = Instant::now();
        let outcome = self.inner.process(envelope, context, cancel).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &outcome {
            Ok(result) if result.success => {
                match self.success_level {
                    Level::TRACE => tracing::trace!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, "message processed"),
                    Level::DEBUG => debug!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, "message processed"),
                    Level::INFO => tracing::info!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, "message processed"),
                    _ => debug!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, "message processed"),
                }
            }
            Ok(result) => {
                warn!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, error = ?result.error, "message processing failed");
            }
            Err(err) => {
                error!(message_id = %envelope.id, type_name = self.type_name, elapsed_ms, error = %err, "message processing raised an exception");
            }
        }

        outcome
    }
}
