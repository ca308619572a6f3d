//! Metrics decorator: `.started`/`.succeeded`/`.failed`/`.exceptions`/`.duration`
//! counters per message type, plus `.retried` on a retried terminal failure.
//!
//! The metrics decorator is the only decorator that increments `.exceptions`;
//! inner decorators that also observe the same exception (retry, circuit
//! breaker, error-handling) do not double count it — see SPEC_FULL.md's
//! resolution of the exception/metrics-ordering open question.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use courier_common::{Envelope, MetricsCollector, ProcessingContext};
use tokio_util::sync::CancellationToken;

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct MetricsDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    collector: Arc<dyn MetricsCollector>,
    type_name: &'static str,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> MetricsDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, collector: Arc<dyn MetricsCollector>, type_name: &'static str) -> Self {
        Self { inner, collector, type_name, _marker: PhantomData }
    }

    fn metric(&self, suffix: &str) -> String {
        format!("messages.{}.{}", self.type_name, suffix)
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for MetricsDecorator<M, R>
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
        self.collector.increment(&self.metric("started"), 1);
        let started = Instant::now();

        let outcome = self.inner.process(envelope, context, cancel).await;

        self.collector.record_duration(&self.metric("duration"), started.elapsed());

        match &outcome {
            Ok(result) if result.success => {
                self.collector.increment(&self.metric("succeeded"), 1);
            }
            Ok(_) => {
                self.collector.increment(&self.metric("failed"), 1);
                if context.retry_count > 0 {
                    self.collector.increment(&self.metric("retried"), context.retry_count as u64);
                }
            }
            Err(_) => {
                self.collector.increment(&self.metric("exceptions"), 1);
            }
        }

        outcome
    }
}
