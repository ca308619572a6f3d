//! `CommandProcessor`: resolves the single registered handler for a command
//! type, runs it through a decorator pipeline, and exposes processed/failed
//! counts and average duration.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{Command, CourierError, Envelope, InMemoryMetricsCollector, ProcessingContext, ProcessingResult};
use courier_pipeline::{BoxProcessor, LoggingDecorator, MetricsDecorator, PipelineBuilder, ProcessOutcome, Processor};
use tokio_util::sync::CancellationToken;

use crate::registry::HandlerRegistry;

struct CommandCore<C: Command, Reg: HandlerRegistry> {
    registry: Arc<Reg>,
    _marker: PhantomData<C>,
}

#[async_trait]
impl<C, Reg> Processor<C, C::Response> for CommandCore<C, Reg>
where
    C: Command,
    Reg: HandlerRegistry + 'static,
{
    async fn process(
        &self,
        envelope: &Envelope<C>,
        _context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<C::Response> {
        if cancel.is_cancelled() {
            return Err(CourierError::Canceled);
        }

        let handler = self
            .registry
            .resolve_command::<C>()
            .ok_or_else(|| CourierError::NoHandlerFound(C::type_name().to_string()))?;

        let response = handler.handle(envelope.payload.clone(), cancel).await?;
        Ok(ProcessingResult::success("command handled", response))
    }
}

/// Resolves, pipelines, and invokes a single command type's registered
/// handler. One instance is typically built per command type at startup.
pub struct CommandProcessor<C: Command, Reg: HandlerRegistry> {
    processor: BoxProcessor<C, C::Response>,
    metrics: Arc<InMemoryMetricsCollector>,
    _marker: PhantomData<C>,
    _registry: PhantomData<Reg>,
}

impl<C, Reg> CommandProcessor<C, Reg>
where
    C: Command + std::fmt::Debug,
    Reg: HandlerRegistry + 'static,
{
    pub fn new(registry: Arc<Reg>) -> Self {
        Self::with_pipeline(registry, |builder| builder)
    }

    /// Builds with `configure` given the chance to append the rest of the
    /// decorator catalog (validation, correlation, retry, circuit breaker,
    /// error handling, transaction scoping) inside the metrics/logging pair
    /// every `CommandProcessor` carries regardless, so `processed_count`/
    /// `failed_count`/`average_duration` stay accurate even when those
    /// decorators short-circuit or retry.
    pub fn with_pipeline(
        registry: Arc<Reg>,
        configure: impl FnOnce(PipelineBuilder<C, C::Response>) -> PipelineBuilder<C, C::Response>,
    ) -> Self {
        let metrics = Arc::new(InMemoryMetricsCollector::new());
        let core: BoxProcessor<C, C::Response> = Arc::new(CommandCore { registry, _marker: PhantomData });

        let builder = PipelineBuilder::new()
            .use_decorator({
                let metrics = metrics.clone();
                move |inner| Arc::new(MetricsDecorator::new(inner, metrics.clone(), C::type_name())) as BoxProcessor<C, C::Response>
            })
            .use_decorator(move |inner| Arc::new(LoggingDecorator::new(inner, C::type_name())) as BoxProcessor<C, C::Response>);

        let processor = configure(builder).build(core);

        Self { processor, metrics, _marker: PhantomData, _registry: PhantomData }
    }

    /// Sends `command` through the pipeline. `None` fails with
    /// `ArgumentError`; a missing handler fails with `NoHandlerFound`; a
    /// handler exception propagates after being counted in metrics.
    pub async fn send(&self, command: Option<C>, cancel: &CancellationToken) -> Result<C::Response, CourierError> {
        let command = command.ok_or_else(|| CourierError::ArgumentError("command must not be absent".to_string()))?;

        let envelope = Envelope::new(command);
        let mut context = ProcessingContext::new("CommandProcessor");
        let outcome = self.processor.process(&envelope, &mut context, cancel).await?;

        if outcome.success {
            Ok(outcome.data.expect("successful command result must carry a response"))
        } else {
            Err(outcome.error.unwrap_or(CourierError::HandlerError(outcome.message)))
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.metrics.get_counter(&format!("messages.{}.succeeded", C::type_name()))
    }

    pub fn failed_count(&self) -> u64 {
        self.metrics.get_counter(&format!("messages.{}.failed", C::type_name()))
            + self.metrics.get_counter(&format!("messages.{}.exceptions", C::type_name()))
    }

    pub fn average_duration(&self) -> Duration {
        self.metrics.get_average_duration(&format!("messages.{}.duration", C::type_name()))
    }
}
