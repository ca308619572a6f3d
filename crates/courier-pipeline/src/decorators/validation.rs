//! Validation decorator: runs a `Validator<M>` before the inner processor and
//! short-circuits to a failed result (never an exception) on invalid input.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{CourierError, Envelope, ProcessingContext, ProcessingResult, ValidationFailure, Validator};
use tokio_util::sync::CancellationToken;

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

pub struct ValidationDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    validator: Arc<dyn Validator<M>>,
    _marker: PhantomData<fn() -> R>,
}

impl<M, R> ValidationDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, validator: Arc<dyn Validator<M>>) -> Self {
        Self { inner, validator, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for ValidationDecorator<M, R>
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
        let result = self.validator.validate(&envelope.payload, cancel).await;
        if !result.is_valid {
            tracing::warn!(message_id = %envelope.id, errors = ?result.errors, "message failed validation");
            return Ok(ProcessingResult::failure(
                "validation failed",
                CourierError::ValidationError(ValidationFailure { errors: result.errors }),
            ));
        }

        self.inner.process(envelope, context, cancel).await
    }
}
