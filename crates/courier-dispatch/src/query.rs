//! `QueryProcessor`: same shape as `CommandProcessor` but always returns a
//! response and additionally exposes a `cache-hit-rate` reserved for future
//! caching layers (defaults to zero since none is wired in here).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{CourierError, Envelope, InMemoryMetricsCollector, ProcessingContext, ProcessingResult, Query};
use courier_pipeline::{BoxProcessor, LoggingDecorator, MetricsDecorator, PipelineBuilder, ProcessOutcome, Processor};
use tokio_util::sync::CancellationToken;

use crate::registry::HandlerRegistry;

struct QueryCore<Q: Query, Reg: HandlerRegistry> {
    registry: Arc<Reg>,
    _marker: PhantomData<Q>,
}

#[async_trait]
impl<Q, Reg> Processor<Q, Q::Response> for QueryCore<Q, Reg>
where
    Q: Query,
    Reg: HandlerRegistry + 'static,
{
    async fn process(
        &self,
        envelope: &Envelope<Q>,
        _context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<Q::Response> {
        if cancel.is_cancelled() {
            return Err(CourierError::Canceled);
        }

        let handler = self
            .registry
            .resolve_query::<Q>()
            .ok_or_else(|| CourierError::NoHandlerFound(Q::type_name().to_string()))?;

        let response = handler.handle(envelope.payload.clone(), cancel).await?;
        Ok(ProcessingResult::success("query handled", response))
    }
}

pub struct QueryProcessor<Q: Query, Reg: HandlerRegistry> {
    processor: BoxProcessor<Q, Q::Response>,
    metrics: Arc<InMemoryMetricsCollector>,
    _marker: PhantomData<Q>,
    _registry: PhantomData<Reg>,
}

impl<Q, Reg> QueryProcessor<Q, Reg>
where
    Q: Query + std::fmt::Debug,
    Reg: HandlerRegistry + 'static,
{
    pub fn new(registry: Arc<Reg>) -> Self {
        Self::with_pipeline(registry, |builder| builder)
    }

    /// Builds with `configure` given the chance to append the rest of the
    /// decorator catalog (validation, correlation, retry, circuit breaker,
    /// error handling, transaction scoping) inside the metrics/logging pair
    /// every `QueryProcessor` carries regardless.
    pub fn with_pipeline(
        registry: Arc<Reg>,
        configure: impl FnOnce(PipelineBuilder<Q, Q::Response>) -> PipelineBuilder<Q, Q::Response>,
    ) -> Self {
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let core: BoxProcessor<Q, Q::Response> = Arc::new(QueryCore { registry, _marker: PhantomData });

        let builder = PipelineBuilder::new()
            .use_decorator({
                let metrics = metrics.clone();
                move |inner| Arc::new(MetricsDecorator::new(inner, metrics.clone(), Q::type_name())) as BoxProcessor<Q, Q::Response>
            })
            .use_decorator(move |inner| Arc::new(LoggingDecorator::new(inner, Q::type_name())) as BoxProcessor<Q, Q::Response>);

        let processor = configure(builder).build(core);

        Self { processor, metrics, _marker: PhantomData, _registry: PhantomData }
    }

    pub async fn send(&self, query: Option<Q>, cancel: &CancellationToken) -> Result<Q::Response, CourierError> {
        let query = query.ok_or_else(|| CourierError::ArgumentError("query must not be absent".to_string()))?;

        let envelope = Envelope::new(query);
        let mut context = ProcessingContext::new("QueryProcessor");
        let outcome = self.processor.process(&envelope, &mut context, cancel).await?;

        if outcome.success {
            Ok(outcome.data.expect("successful query result must carry a response"))
        } else {
            Err(outcome.error.unwrap_or(CourierError::HandlerError(outcome.message)))
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.metrics.get_counter(&format!("messages.{}.succeeded", Q::type_name()))
    }

    pub fn failed_count(&self) -> u64 {
        self.metrics.get_counter(&format!("messages.{}.failed", Q::type_name()))
            + self.metrics.get_counter(&format!("messages.{}.exceptions", Q::type_name()))
    }

    pub fn average_duration(&self) -> Duration {
        self.metrics.get_average_duration(&format!("messages.{}.duration", Q::type_name()))
    }

    /// Reserved for a future caching layer; always zero since this crate
    /// ships no cache.
    pub fn cache_hit_rate(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::QueryHandler;
    use crate::registry::DashMapRegistry;

    #[derive(Debug, Clone)]
    struct GetUserName {
        id: u64,
    }

    impl Query for GetUserName {
        type Response = String;
        fn type_name() -> &'static str {
            "GetUserName"
        }
    }

    struct GetUserNameHandler;
    #[async_trait]
    impl QueryHandler<GetUserName> for GetUserNameHandler {
        async fn handle(&self, query: GetUserName, _cancel: &CancellationToken) -> Result<String, CourierError> {
            Ok(format!("user-{}", query.id))
        }
    }

    #[tokio::test]
    async fn sends_query_and_returns_response() {
        let registry = Arc::new(DashMapRegistry::new());
        registry.register_query::<GetUserName>(Arc::new(GetUserNameHandler));

        let processor = QueryProcessor::<GetUserName, DashMapRegistry>::new(registry);
        let response = processor.send(Some(GetUserName { id: 42 }), &CancellationToken::new()).await.unwrap();

        assert_eq!(response, "user-42");
        assert_eq!(processor.cache_hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn with_pipeline_wires_a_retry_policy_around_the_handler() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct FlakyOnce(Arc<AtomicU32>);
        #[async_trait]
        impl QueryHandler<GetUserName> for FlakyOnce {
            async fn handle(&self, query: GetUserName, _cancel: &CancellationToken) -> Result<String, CourierError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CourierError::TransientError("Timeout".into()))
                } else {
                    Ok(format!("user-{}", query.id))
                }
            }
        }

        let registry = Arc::new(DashMapRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        registry.register_query::<GetUserName>(Arc::new(FlakyOnce(calls.clone())));

        let clock: Arc<dyn courier_common::Clock> = Arc::new(courier_common::SystemClock);
        let policy: Arc<dyn courier_pipeline::RetryPolicy> =
            Arc::new(courier_pipeline::ExponentialBackoff::new(2, Duration::from_millis(1), Duration::from_millis(5), 0.0));

        let processor = QueryProcessor::<GetUserName, DashMapRegistry>::with_pipeline(registry, move |builder| {
            builder.use_retry(policy.clone(), clock.clone())
        });

        let response = processor.send(Some(GetUserName { id: 7 }), &CancellationToken::new()).await.unwrap();
        assert_eq!(response, "user-7");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
