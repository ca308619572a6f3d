//! Transaction decorator: runs the inner processor inside a unit-of-work
//! boundary, committing on a successful terminal result and rolling back on a
//! result-level failure or a propagated exception.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::{CourierError, Envelope, ProcessingContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::processor::{BoxProcessor, ProcessOutcome, Processor};

/// A unit-of-work boundary a storage backend can plug into the pipeline.
/// `begin`/`commit`/`rollback` bracket exactly one `process` call.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    async fn begin(&self) -> Result<(), CourierError>;
    async fn commit(&self) -> Result<(), CourierError>;
    async fn rollback(&self) -> Result<(), CourierError>;
}

/// A transaction executor with no backing store, used when the pipeline runs
/// in front of an in-memory registry or in tests that don't exercise
/// persistence.
pub struct NoopTransactionExecutor;

#[async_trait]
impl TransactionExecutor for NoopTransactionExecutor {
    async fn begin(&self) -> Result<(), CourierError> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), CourierError> {
        Ok(())
    }

    async fn rollback(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

pub struct TransactionDecorator<M, R> {
    inner: BoxProcessor<M, R>,
    executor: Arc<dyn TransactionExecutor>,
    _marker: PhantomData<fn() -> (M, R)>,
}

impl<M, R> TransactionDecorator<M, R> {
    pub fn new(inner: BoxProcessor<M, R>, executor: Arc<dyn TransactionExecutor>) -> Self {
        Self { inner, executor, _marker: PhantomData }
    }
}

#[async_trait]
impl<M, R> Processor<M, R> for TransactionDecorator<M, R>
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
        self.executor.begin().await?;

        let outcome = self.inner.process(envelope, context, cancel).await;

        match &outcome {
            Ok(result) if result.success => {
                self.executor.commit().await?;
                debug!(message_id = %envelope.id, "transaction committed");
            }
            _ => {
                if let Err(rollback_err) = self.executor.rollback().await {
                    warn!(message_id = %envelope.id, error = %rollback_err, "rollback itself failed");
                } else {
                    debug!(message_id = %envelope.id, "transaction rolled back");
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use courier_common::{CourierError, Envelope, ProcessingResult};

    use super::*;
    use crate::processor::FnProcessor;

    struct RecordingExecutor {
        begins: AtomicU32,
        commits: AtomicU32,
        rollbacks: AtomicU32,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            Self { begins: AtomicU32::new(0), commits: AtomicU32::new(0), rollbacks: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl TransactionExecutor for RecordingExecutor {
        async fn begin(&self) -> Result<(), CourierError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn commit(&self) -> Result<(), CourierError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn rollback(&self) -> Result<(), CourierError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn success_commits_the_transaction() {
        let executor = Arc::new(RecordingExecutor::new());
        let inner: BoxProcessor<i32, i32> = Arc::new(FnProcessor::new(|env: Envelope<i32>, _cancel: CancellationToken| async move {
            Ok(ProcessingResult::success("ok", env.payload))
        }));

        let decorator = TransactionDecorator::new(inner, executor.clone());
        let envelope = Envelope::new(1);
        let mut ctx = ProcessingContext::new("test");
        decorator.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(executor.begins.load(Ordering::SeqCst), 1);
        assert_eq!(executor.commits.load(Ordering::SeqCst), 1);
        assert_eq!(executor.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn result_level_failure_rolls_back() {
        let executor = Arc::new(RecordingExecutor::new());
        let inner: BoxProcessor<i32, i32> = Arc::new(FnProcessor::new(|_env: Envelope<i32>, _cancel: CancellationToken| async move {
            Ok(ProcessingResult::failure("nope", CourierError::HandlerError("bad".to_string())))
        }));

        let decorator = TransactionDecorator::new(inner, executor.clone());
        let envelope = Envelope::new(1);
        let mut ctx = ProcessingContext::new("test");
        decorator.process(&envelope, &mut ctx, &CancellationToken::new()).await.unwrap();

        assert_eq!(executor.commits.load(Ordering::SeqCst), 0);
        assert_eq!(executor.rollbacks.load(Ordering::SeqCst), 1);
    }
}
