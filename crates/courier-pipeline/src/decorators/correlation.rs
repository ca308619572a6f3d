//! Correlation decorator: establishes a process-scoped correlation context and
//! writes `CorrelationId`/`CausationId`/`MessageId` into the processing
//! context's metadata, guaranteed to clear on every exit path.

use std::marker::PhantomData;

use async_trait::async_trait;
use courier_common::{correlation, Envelope, MetadataValue, ProcessingContext};
use tokio_util::sync::CancellationToken;

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct CorrelationDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> CorrelationDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>) -> Self {
        Self { inner, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for CorrelationDecorator<M, R>
where
    M: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    async fn process(
        &self,
        envelope: &Envelope<M>,
        context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<R> {
        context.metadata.insert("CorrelationId".to_string(), MetadataValue::String(envelope.effective_correlation_id()));
        context.metadata.insert(
            "CausationId".to_string(),
            MetadataValue::String(envelope.causation_id.clone().unwrap_or_default()),
        );
        context.metadata.insert("MessageId".to_string(), MetadataValue::String(envelope.id.to_string()));

        let ctx = correlation::CorrelationContext {
            correlation_id: envelope.effective_correlation_id(),
            message_id: envelope.id.to_string(),
        };

        // `scope` clears the task-local context on every exit path, including
        // panics unwinding through the inner future.
        correlation::scope(ctx, || self.inner.process(envelope, context, cancel)).await
    }
}
