//! The processor abstraction every decorator and the three core processors
//! implement: `process(message, context, cancel) -> ProcessingResult`.
//!
//! `process` returns `Result<ProcessingResult<R>, CourierError>`: `Ok` is a
//! terminal result (possibly `success = false`, e.g. a validation failure or a
//! circuit-open short-circuit), `Err` is an exception that propagates to the
//! caller. A message never produces both and never produces neither — see the
//! design note on replacing throw/catch control flow with an explicit result
//! type at component boundaries.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{CourierError, Envelope, ProcessingContext, ProcessingResult};
use tokio_util::sync::CancellationToken;

pub type ProcessOutcome<R> = Result<ProcessingResult<R>, CourierError>;

/// A processor transforms an envelope and a processing context into a
/// terminal result. Decorators are processors that hold an inner processor
/// and may transform inputs, observe outputs, short-circuit, or retry.
#[async_trait]
pub trait Processor<M, R>: Send + Sync {
    async fn process(
        &self,
        envelope: &Envelope<M>,
        context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<R>;
}

/// A reference-counted, type-erased processor, the unit decorators wrap.
pub type BoxProcessor<M, R> = Arc<dyn Processor<M, R>>;

/// Adapts a plain async closure into a `Processor`, for the innermost handler
/// invocation at the bottom of a pipeline.
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<M, R, F, Fut> Processor<M, R> for FnProcessor<F>
where
    M: Send + Sync + Clone + 'static,
    R: Send + Sync + 'static,
    F: Fn(Envelope<M>, CancellationToken) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ProcessOutcome<R>> + Send,
{
    async fn process(
        &self,
        envelope: &Envelope<M>,
        _context: &mut ProcessingContext,
        cancel: &CancellationToken,
    ) -> ProcessOutcome<R> {
        (self.f)(envelope.clone(), cancel.clone()).await
    }
}
