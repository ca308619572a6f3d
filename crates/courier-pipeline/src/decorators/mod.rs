//! The cross-cutting decorator catalog: validation, logging, metrics,
//! correlation, retry, circuit breaker, error handling, and transaction
//! scoping, each wrapping a `BoxProcessor` and composed by `PipelineBuilder`.

pub mod circuit_breaker;
pub mod correlation;
pub mod error_handling;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod transaction;
pub mod validation;

pub use circuit_breaker::CircuitBreakerDecorator;
pub use correlation::CorrelationDecorator;
pub use error_handling::ErrorHandlingDecorator;
pub use logging::LoggingDecorator;
pub use metrics::MetricsDecorator;
pub use retry::RetryDecorator;
pub use transaction::{NoopTransactionExecutor, TransactionDecorator, TransactionExecutor};
pub use validation::ValidationDecorator;
