//! Circuit breaker decorator: short-circuits to a failed result with
//! `CourierError::CircuitOpen` while the breaker is open, otherwise forwards
//! to the inner processor and feeds its outcome back into the breaker.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{CourierError, Envelope, ProcessingContext, ProcessingResult};
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::CircuitBreaker;
use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct CircuitBreakerDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    breaker: Arc<CircuitBreaker>,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> CircuitBreakerDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for CircuitBreakerDecorator<M, R>
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
        if !self.breaker.allow_request() {
            tracing::warn!(message_id = %envelope.id, "circuit open, short-circuiting");
            return Ok(ProcessingResult::failure("circuit open", CourierError::CircuitOpen));
        }

        let outcome = self.inner.process(envelope, context, cancel).await;

        match &outcome {
            Ok(result) if result.success => self.breaker.record_success(),
            _ => self.breaker.record_failure(),
        }

        outcome
    }
}
