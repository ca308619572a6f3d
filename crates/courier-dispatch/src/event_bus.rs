//! `EventBus`: fans an event out to every registered handler, dispatching
//! each handler independently on a bounded worker pool and returning to the
//! caller as soon as the event is accepted for dispatch.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_common::{
    CourierError, Envelope, Event, ErrorContext, ErrorDecision, ErrorHandler, InMemoryMetricsCollector, MetricsCollector,
    ProcessingContext,
};
use courier_pipeline::{ExponentialBackoff, RetryPolicy};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::handlers::EventHandler;
use crate::registry::HandlerRegistry;

pub struct EventBusConfig {
    /// Maximum number of handler invocations running concurrently across all
    /// event types.
    pub parallelism: usize,
    pub default_max_retries: u32,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { parallelism: 16, default_max_retries: 3 }
    }
}

/// Resolves and dispatches handlers for published events. One instance
/// serves every event type registered in `Reg`.
pub struct EventBus<Reg: HandlerRegistry> {
    registry: Arc<Reg>,
    config: EventBusConfig,
    metrics: Arc<InMemoryMetricsCollector>,
    error_handlers: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
    semaphore: Arc<Semaphore>,
    registered_handlers: Mutex<(TypeId, usize)>,
    in_flight: Arc<AtomicUsize>,
}

impl<Reg> EventBus<Reg>
where
    Reg: HandlerRegistry + 'static,
{
    pub fn new(registry: Arc<Reg>) -> Self {
        Self::with_config(registry, EventBusConfig::default())
    }

    pub fn with_config(registry: Arc<Reg>, config: EventBusConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
        Self {
            registry,
            config,
            metrics: Arc::new(InMemoryMetricsCollector::new()),
            error_handlers: DashMap::new(),
            semaphore,
            registered_handlers: Mutex::new((TypeId::of::<()>(), 0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers an error handler consulted for a given event type's handler
    /// dispatch loop. Without one, the default exponential backoff retry
    /// policy governs retries until exhaustion.
    pub fn register_error_handler<E: Event>(&self, handler: Arc<dyn ErrorHandler<E>>) {
        self.error_handlers.insert(TypeId::of::<E>(), Box::new(handler));
    }

    /// Publishes `event` to every handler registered for its runtime type.
    /// Returns once the event has been accepted for dispatch, not once
    /// delivery completes — call `wait_idle` in tests that need to observe
    /// terminal metrics deterministically.
    pub async fn publish<E: Event + std::fmt::Debug>(
        &self,
        event: Option<E>,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        let event = event.ok_or_else(|| CourierError::ArgumentError("event must not be absent".to_string()))?;

        let handlers = self.registry.resolve_events::<E>();
        *self.registered_handlers.lock() = (TypeId::of::<E>(), handlers.len());

        if handlers.is_empty() {
            debug!(event_type = E::type_name(), "no handlers registered, publish is a no-op");
            return Ok(());
        }

        let envelope = Arc::new(Envelope::new(event));
        let error_handler = self
            .error_handlers
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn ErrorHandler<E>>>().cloned());

        for handler in handlers {
            let envelope = envelope.clone();
            let error_handler = error_handler.clone();
            let metrics = self.metrics.clone();
            let semaphore = self.semaphore.clone();
            let in_flight = self.in_flight.clone();
            let max_retries = self.config.default_max_retries;
            let cancel = cancel.clone();

            in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                dispatch_one::<E>(envelope, handler, error_handler, &metrics, max_retries, &cancel).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }

        Ok(())
    }

    /// Polls until every in-flight handler dispatch has completed. Intended
    /// for tests; production callers observe progress via metrics instead.
    pub async fn wait_idle(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn published_count(&self) -> u64 {
        self.metrics.get_counter("events.published")
    }

    pub fn failed_count(&self) -> u64 {
        self.metrics.get_counter("events.failed")
    }

    /// Handler count for the most recently published event type (not a
    /// global tally across all event types ever published).
    pub fn registered_handlers(&self) -> usize {
        self.registered_handlers.lock().1
    }
}

async fn dispatch_one<E: Event>(
    envelope: Arc<Envelope<E>>,
    handler: Arc<dyn EventHandler<E>>,
    error_handler: Option<Arc<dyn ErrorHandler<E>>>,
    metrics: &InMemoryMetricsCollector,
    max_retries: u32,
    cancel: &CancellationToken,
) {
    let mut context = ProcessingContext::new("EventBus");
    let mut error_ctx = ErrorContext::first_failure("EventBus", max_retries, chrono::Utc::now());
    error_ctx.metadata.insert(
        "EventType".to_string(),
        courier_common::MetadataValue::String(E::type_name().to_string()),
    );
    error_ctx.metadata.insert(
        "HandlerType".to_string(),
        courier_common::MetadataValue::String(handler.type_name().to_string()),
    );
    let default_policy = ExponentialBackoff::default_policy();

    let mut attempt = 0u32;
    loop {
        let result = handler.handle(envelope.payload.clone(), cancel).await;
        context.metadata.insert(
            "EventType".to_string(),
            courier_common::MetadataValue::String(E::type_name().to_string()),
        );

        match result {
            Ok(()) => {
                metrics.increment("events.published", 1);
                return;
            }
            Err(err) => {
                let now = chrono::Utc::now();
                context.record_failure(now);
                error_ctx.advance(now);

                if let Some(handler) = &error_handler {
                    let decision = handler.handle(&envelope.payload, &err, &error_ctx).await;
                    match decision {
                        ErrorDecision::Retry(delay) if !error_ctx.retries_exhausted() => {
                            context.next_attempt();
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => {
                                    metrics.increment("events.failed", 1);
                                    return;
                                }
                            }
                        }
                        ErrorDecision::Retry(_) => {
                            error!(event_type = E::type_name(), "retry requested but retries exhausted");
                            metrics.increment("events.failed", 1);
                            return;
                        }
                        ErrorDecision::SendToDeadLetter(reason) => {
                            warn!(event_type = E::type_name(), reason = %reason, "event sent to dead letter");
                            metrics.increment("events.failed", 1);
                            return;
                        }
                        ErrorDecision::Discard(reason) => {
                            warn!(event_type = E::type_name(), reason = %reason, "event discarded");
                            metrics.increment("events.failed", 1);
                            return;
                        }
                        ErrorDecision::Escalate => {
                            error!(event_type = E::type_name(), error = %err, "event handler error escalated");
                            metrics.increment("events.failed", 1);
                            return;
                        }
                    }
                } else if default_policy.should_retry(Some(&err), attempt) && attempt < max_retries {
                    let delay = default_policy.delay(attempt);
                    context.next_attempt();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            metrics.increment("events.failed", 1);
                            return;
                        }
                    }
                } else {
                    error!(event_type = E::type_name(), error = %err, "event handler failed, retries exhausted");
                    metrics.increment("events.failed", 1);
                    return;
                }
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    use async_trait::async_trait;

    use super::*;
    use crate::registry::DashMapRegistry;

    #[derive(Debug, Clone)]
    struct Pinged;
    impl Event for Pinged {
        fn type_name() -> &'static str {
            "Pinged"
        }
    }

    struct CountingHandler(Arc<AtomicU32>);
    #[async_trait]
    impl EventHandler<Pinged> for CountingHandler {
        async fn handle(&self, _event: Pinged, _cancel: &CancellationToken) -> Result<(), CourierError> {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFailingHandler;
    #[async_trait]
    impl EventHandler<Pinged> for AlwaysFailingHandler {
        async fn handle(&self, _event: Pinged, _cancel: &CancellationToken) -> Result<(), CourierError> {
            Err(CourierError::HandlerError("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn publish_with_no_handlers_leaves_published_count_unchanged() {
        let registry = Arc::new(DashMapRegistry::new());
        let bus = EventBus::new(registry);

        bus.publish(Some(Pinged), &CancellationToken::new()).await.unwrap();
        bus.wait_idle().await;

        assert_eq!(bus.published_count(), 0);
        assert_eq!(bus.registered_handlers(), 0);
    }

    #[tokio::test]
    async fn publish_with_one_successful_handler_counts_published() {
        let registry = Arc::new(DashMapRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        registry.register_event::<Pinged>(Arc::new(CountingHandler(calls.clone())));

        let bus = EventBus::new(registry);
        bus.publish(Some(Pinged), &CancellationToken::new()).await.unwrap();
        bus.wait_idle().await;

        assert_eq!(bus.published_count(), 1);
        assert_eq!(bus.failed_count(), 0);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(bus.registered_handlers(), 1);
    }

    #[tokio::test]
    async fn publish_nil_fails_with_argument_error() {
        let registry = Arc::new(DashMapRegistry::new());
        let bus = EventBus::new(registry);
        let result = bus.publish::<Pinged>(None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(CourierError::ArgumentError(_))));
    }

    #[tokio::test]
    async fn discard_decision_invokes_handler_once_then_counts_failure() {
        struct DiscardHandler;
        #[async_trait]
        impl ErrorHandler<Pinged> for DiscardHandler {
            async fn handle(&self, _message: &Pinged, _error: &CourierError, _context: &ErrorContext) -> ErrorDecision {
                ErrorDecision::Discard("not needed".to_string())
            }
        }

        let registry = Arc::new(DashMapRegistry::new());
        registry.register_event::<Pinged>(Arc::new(AlwaysFailingHandler));

        let bus = EventBus::new(registry);
        bus.register_error_handler::<Pinged>(Arc::new(DiscardHandler));

        bus.publish(Some(Pinged), &CancellationToken::new()).await.unwrap();
        bus.wait_idle().await;

        assert_eq!(bus.failed_count(), 1);
    }

    #[tokio::test]
    async fn error_handler_sees_event_type_and_handler_type_in_context_metadata() {
        struct CapturingHandler(Arc<Mutex<Option<courier_common::Metadata>>>);
        #[async_trait]
        impl ErrorHandler<Pinged> for CapturingHandler {
            async fn handle(&self, _message: &Pinged, _error: &CourierError, context: &ErrorContext) -> ErrorDecision {
                *self.0.lock() = Some(context.metadata.clone());
                ErrorDecision::Discard("captured".to_string())
            }
        }

        let registry = Arc::new(DashMapRegistry::new());
        registry.register_event::<Pinged>(Arc::new(AlwaysFailingHandler));

        let bus = EventBus::new(registry);
        let captured = Arc::new(Mutex::new(None));
        bus.register_error_handler::<Pinged>(Arc::new(CapturingHandler(captured.clone())));

        bus.publish(Some(Pinged), &CancellationToken::new()).await.unwrap();
        bus.wait_idle().await;

        let metadata = captured.lock().clone().expect("error handler must have been invoked");
        assert_eq!(
            metadata.get("EventType"),
            Some(&courier_common::MetadataValue::String("Pinged".to_string()))
        );
        assert_eq!(
            metadata.get("HandlerType"),
            Some(&courier_common::MetadataValue::String(
                std::any::type_name::<AlwaysFailingHandler>().to_string()
            ))
        );
    }
}
