//! The decorator pipeline: a core `Processor` abstraction plus the
//! cross-cutting catalog (validation, logging, metrics, correlation, retry,
//! circuit breaking, error handling, transaction scoping) composed by a
//! `PipelineBuilder`.

pub mod builder;
pub mod circuit_breaker;
pub mod decorators;
pub mod processor;
pub mod retry_policy;

pub use builder::PipelineBuilder;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use decorators::{
    CircuitBreakerDecorator, CorrelationDecorator, ErrorHandlingDecorator, LoggingDecorator, MetricsDecorator,
    NoopTransactionExecutor, RetryDecorator, TransactionDecorator, TransactionExecutor, ValidationDecorator,
};
pub use processor::{BoxProcessor, FnProcessor, ProcessOutcome, Processor};
pub use retry_policy::{ExponentialBackoff, RetryPolicy};
