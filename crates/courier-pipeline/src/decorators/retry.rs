//! Retry decorator: re-invokes the inner processor on a transient exception
//! according to a `RetryPolicy`, sleeping between attempts and aborting early
//! on cancellation. Never retries a result-level failure, only an exception.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{Clock, Envelope, ProcessingContext, ProcessingResult};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};
use crate::retry_policy::RetryPolicy;

pub struct RetryDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    policy: Arc<dyn RetryPolicy>,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> RetryDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, policy: Arc<dyn RetryPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self { inner, policy, clock, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for RetryDecorator<M, R>
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
        let mut attempt = 0u32;
        loop {
            let outcome = self.inner.process(envelope, context, cancel).await;

            let error = match &outcome {
                Err(err) => err,
                Ok(_) => return outcome,
            };

            if cancel.is_cancelled() {
                return outcome;
            }

            if !self.policy.should_retry(Some(error), attempt) {
                let error = error.clone();
                return Ok(ProcessingResult::failure(format!("Failed after {attempt} retries"), error));
            }

            context.record_failure(self.clock.now());
            context.next_attempt();

            let delay = self.policy.delay(attempt);
            warn!(
                message_id = %envelope.id,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "retrying after transient error"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return outcome,
            }

            attempt += 1;
        }
    }
}
