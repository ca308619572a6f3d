//! Declarative assembly of a decorator pipeline around a core processor.
//!
//! Decorators are appended in the order they should apply from the outside
//! in: the first `.use_*()` call becomes the outermost layer a caller's
//! request passes through first, matching how a reader expects a pipeline
//! declared top-to-bottom to read.

use std::sync::Arc;

use courier_common::{Clock, ErrorHandler, MetricsCollector, Validator};

use crate::circuit_breaker::CircuitBreaker;
use crate::decorators::{
    CircuitBreakerDecorator, CorrelationDecorator, ErrorHandlingDecorator, LoggingDecorator, MetricsDecorator,
    RetryDecorator, TransactionDecorator, TransactionExecutor, ValidationDecorator,
};
use crate::processor::BoxProcessor;
use crate::retry_policy::RetryPolicy;

type Factory<M, R> = Box<dyn Fn(BoxProcessor<M, R>) -> BoxProcessor<M, R> + Send + Sync>;

pub struct PipelineBuilder<M, R> {
    factories: Vec<Factory<M, R>>,
}

impl<M, R> PipelineBuilder<M, R>
where
    M: std::fmt::Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { factories: Vec::new() }
    }

    /// Append an arbitrary decorator factory. Declared earlier means wraps
    /// further out; see the module doc.
    pub fn use_decorator<F>(mut self, factory: F) -> Self
    where
        F: Fn(BoxProcessor<M, R>) -> BoxProcessor<M, R> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    pub fn use_validation(self, validator: Arc<dyn Validator<M>>) -> Self {
        self.use_decorator(move |inner| Arc::new(ValidationDecorator::new(inner, validator.clone())))
    }

    pub fn use_logging(self, type_name: &'static str) -> Self {
        self.use_decorator(move |inner| Arc::new(LoggingDecorator::new(inner, type_name)))
    }

    pub fn use_metrics(self, collector: Arc<dyn MetricsCollector>, type_name: &'static str) -> Self {
        self.use_decorator(move |inner| Arc::new(MetricsDecorator::new(inner, collector.clone(), type_name)))
    }

    pub fn use_correlation(self) -> Self {
        self.use_decorator(|inner| Arc::new(CorrelationDecorator::new(inner)))
    }

    pub fn use_retry(self, policy: Arc<dyn RetryPolicy>, clock: Arc<dyn Clock>) -> Self {
        self.use_decorator(move |inner| Arc::new(RetryDecorator::new(inner, policy.clone(), clock.clone())))
    }

    pub fn use_circuit_breaker(self, breaker: Arc<CircuitBreaker>) -> Self {
        self.use_decorator(move |inner| Arc::new(CircuitBreakerDecorator::new(inner, breaker.clone())))
    }

    pub fn use_error_handling(self, handler: Arc<dyn ErrorHandler<M>>, max_retries: u32) -> Self {
        self.use_decorator(move |inner| Arc::new(ErrorHandlingDecorator::new(inner, handler.clone(), max_retries)))
    }

    pub fn use_transaction(self, executor: Arc<dyn TransactionExecutor>) -> Self {
        self.use_decorator(move |inner| Arc::new(TransactionDecorator::new(inner, executor.clone())))
    }

    /// Wrap `inner` with every declared decorator, outermost-first.
    pub fn build(self, inner: BoxProcessor<M, R>) -> BoxProcessor<M, R> {
        self.factories.into_iter().rev().fold(inner, |current, factory| factory(current))
    }
}

impl<M, R> Default for PipelineBuilder<M, R>
where
    M: std::fmt::Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use courier_common::{Envelope, ProcessingContext, ProcessingResult};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::processor::{FnProcessor, ProcessOutcome, Processor};

    fn recording_decorator<M, R>(
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> impl Fn(BoxProcessor<M, R>) -> BoxProcessor<M, R>
    where
        M: Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        move |inner| Arc::new(RecordingDecorator { inner, log: log.clone(), label })
    }

    struct RecordingDecorator<M, R> {
        inner: BoxProcessor<M, R>,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    #[async_trait]
    impl<M, R> Processor<M, R> for RecordingDecorator<M, R>
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
            self.log.lock().push(self.label);
            self.inner.process(envelope, context, cancel).await
        }
    }

    #[tokio::test]
    async fn decorators_apply_outermost_first_in_declared_order() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let inner: BoxProcessor<u32, u32> = Arc::new(FnProcessor::new(|_env, _cancel| async move {
            Ok(ProcessingResult::success("done", 1u32))
        }));

        let built: BoxProcessor<u32, u32> = PipelineBuilder::new()
            .use_decorator(recording_decorator(log.clone(), "first"))
            .use_decorator(recording_decorator(log.clone(), "second"))
            .use_decorator(recording_decorator(log.clone(), "third"))
            .build(inner);

        let envelope = Envelope::new(7u32);
        let mut ctx = ProcessingContext::new("test");
        built.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn empty_pipeline_runs_inner_directly() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let inner: BoxProcessor<u32, u32> = Arc::new(FnProcessor::new(move |_env, _cancel| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ProcessingResult::success("done", 1u32))
            }
        }));

        let built = PipelineBuilder::new().build(inner);
        let envelope = Envelope::new(1u32);
        let mut ctx = ProcessingContext::new("test");
        built.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
