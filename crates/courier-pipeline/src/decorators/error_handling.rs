//! Error-handling decorator: the last line of defense around an exception,
//! consulting an `ErrorHandler<M>` for a disposition (retry, dead-letter,
//! discard, escalate) instead of letting the exception propagate unexamined.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{Envelope, ErrorContext, ErrorDecision, ErrorHandler, ProcessingContext, ProcessingResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct ErrorHandlingDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    handler: Arc<dyn ErrorHandler<M>>,
    max_retries: u32,
    _marker: PhantomData<fn() -> R>,
}

impl<M, R> ErrorHandlingDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, handler: Arc<dyn ErrorHandler<M>>, max_retries: u32) -> Self {
        Self { inner, handler, max_retries, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for ErrorHandlingDecorator<M, R>
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
        loop {
            let outcome = self.inner.process(envelope, context, cancel).await;

            let error = match &outcome {
                Err(err) => err.clone(),
                Ok(_) => return outcome,
            };

            let now = chrono::Utc::now();
            context.record_failure(now);
            let mut error_ctx = ErrorContext::first_failure(context.component.clone(), self.max_retries, now);
            error_ctx.retry_count = context.retry_count;

            let decision = self.handler.handle(&envelope.payload, &error, &error_ctx).await;

            match decision {
                ErrorDecision::Retry(delay) if !error_ctx.retries_exhausted() => {
                    info!(message_id = %envelope.id, delay_ms = delay.as_millis(), "error handler requested retry");
                    context.next_attempt();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return outcome,
                    }
                }
                ErrorDecision::Retry(_) => {
                    error!(message_id = %envelope.id, retry_count = error_ctx.retry_count, "error handler requested retry but retries are exhausted");
                    return Ok(ProcessingResult::failure(
                        format!("Failed after {} retries", error_ctx.retry_count),
                        error,
                    ));
                }
                ErrorDecision::SendToDeadLetter(reason) => {
                    info!(message_id = %envelope.id, reason = %reason, "message sent to dead letter");
                    return Ok(ProcessingResult::failure(
                        format!("sent to dead letter: {reason}"),
                        error,
                    ));
                }
                ErrorDecision::Discard(reason) => {
                    info!(message_id = %envelope.id, reason = %reason, "message discarded");
                    return Ok(ProcessingResult::failure(format!("discarded: {reason}"), error));
                }
                ErrorDecision::Escalate => {
                    error!(message_id = %envelope.id, "error handler escalated exception");
                    return outcome;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_common::{CourierError, Envelope, ProcessingResult};

    use super::*;
    use crate::processor::FnProcessor;

    struct DiscardHandler;
    #[async_trait]
    impl ErrorHandler<i32> for DiscardHandler {
        async fn handle(&self, _message: &i32, _error: &CourierError, _context: &ErrorContext) -> ErrorDecision {
            ErrorDecision::Discard("not recoverable".to_string())
        }
    }

    struct RetryOnceHandler;
    #[async_trait]
    impl ErrorHandler<i32> for RetryOnceHandler {
        async fn handle(&self, _message: &i32, _error: &CourierError, _context: &ErrorContext) -> ErrorDecision {
            ErrorDecision::Retry(std::time::Duration::from_millis(1))
        }
    }

    fn raising_inner() -> BoxProcessor<i32, i32> {
        Arc::new(FnProcessor::new(|_env: Envelope<i32>, _cancel: CancellationToken| async move {
            Err(CourierError::HandlerError("boom".to_string()))
        }))
    }

    #[tokio::test]
    async fn discard_decision_yields_failed_result_not_exception() {
        let decorator = ErrorHandlingDecorator::new(raising_inner(), Arc::new(DiscardHandler), 3);
        let envelope = Envelope::new(1);
        let mut ctx = ProcessingContext::new("test");

        let outcome = decorator.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn retry_decision_retries_until_handler_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let inner: BoxProcessor<i32, i32> = Arc::new(FnProcessor::new(move |env: Envelope<i32>, _cancel: CancellationToken| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CourierError::HandlerError("boom".to_string()))
                } else {
                    Ok(ProcessingResult::success("ok", env.payload))
                }
            }
        }));

        let decorator = ErrorHandlingDecorator::new(inner, Arc::new(RetryOnceHandler), 3);
        let envelope = Envelope::new(1);
        let mut ctx = ProcessingContext::new("test");

        let outcome = decorator.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_decision_past_max_retries_yields_terminal_failure() {
        let decorator = ErrorHandlingDecorator::new(raising_inner(), Arc::new(RetryOnceHandler), 2);
        let envelope = Envelope::new(1);
        let mut ctx = ProcessingContext::new("test");

        let outcome = decorator.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Failed after 2 retries");
        assert!(matches!(outcome.error, Some(CourierError::HandlerError(_))));
    }
}
