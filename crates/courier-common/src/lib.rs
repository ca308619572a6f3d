//! Shared message model, processing context, error taxonomy, validation, clock
//! abstraction, metrics, correlation, and logging bootstrap for the Courier
//! messaging and workflow runtime.

pub mod clock;
pub mod context;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod validation;

pub use clock::{Clock, FakeClock, SystemClock};
pub use context::ProcessingContext;
pub use correlation::{current_correlation_id, current_message_id, CorrelationContext};
pub use error::{CourierError, ErrorContext, ErrorDecision, ErrorHandler, ProcessingResult, ValidationFailure, ValidationResult};
pub use message::{Command, Envelope, Event, MessageId, MessageVersion, Metadata, MetadataValue, Query};
pub use metrics::{InMemoryMetricsCollector, MetricSnapshot, MetricsCollector, ProcessorMetrics};
pub use validation::{CompositeValidator, Validator};
