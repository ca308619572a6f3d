//! Error taxonomy shared by the dispatch core, the decorator pipeline, and the
//! outbox/inbox processors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::message::Metadata;

/// The error kinds enumerated in the specification's error taxonomy. Kinds, not
/// concrete type names: every failure in the system is classified into one of
/// these for retry/disposition purposes.
#[derive(Error, Debug, Clone)]
pub enum CourierError {
    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("no handler found for {0}")]
    NoHandlerFound(String),

    #[error("validation failed: {0}")]
    ValidationError(ValidationFailure),

    #[error("transient error: {0}")]
    TransientError(String),

    #[error("critical error: {0}")]
    CriticalError(String),

    #[error("handler error: {0}")]
    HandlerError(String),

    #[error("circuit open")]
    CircuitOpen,

    #[error("canceled")]
    Canceled,
}

/// The ordered list of validation error strings, joined into a human-readable
/// message when displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub errors: Vec<String>,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.errors.join("; "))
    }
}

impl CourierError {
    /// Whether this error belongs to the "critical" class that must never be
    /// retried (out-of-memory, stack overflow, access violation, and the like).
    pub fn is_critical(&self) -> bool {
        matches!(self, CourierError::CriticalError(_))
    }

    /// Whether this error belongs to the "transient" class eligible for retry
    /// (timeout, cancellation of a downstream call, transient network errors).
    /// A `HandlerError` is classified transient if its message mentions one of
    /// the known transient markers, so an inner transient cause wrapped by an
    /// outer handler error still counts as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            CourierError::TransientError(_) => true,
            CourierError::HandlerError(msg) => Self::mentions_transient_marker(msg),
            _ => false,
        }
    }

    fn mentions_transient_marker(msg: &str) -> bool {
        const MARKERS: &[&str] = &["Timeout", "TaskCanceled", "OperationCanceled", "transient"];
        MARKERS.iter().any(|m| msg.contains(m))
    }
}

/// The result of running a validator over a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        assert!(!errors.is_empty(), "an invalid result must carry at least one error");
        Self { is_valid: false, errors }
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        if !other.is_valid {
            self.is_valid = false;
            self.errors.extend(other.errors);
        }
        self
    }
}

/// The terminal, immutable outcome of a `process` call.
#[derive(Debug, Clone)]
pub struct ProcessingResult<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<CourierError>,
}

impl<T> ProcessingResult<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: message.into(), data: Some(data), error: None }
    }

    pub fn success_without_data(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self { success: true, message: message.into(), data: None, error: None }
    }

    pub fn failure(message: impl Into<String>, error: CourierError) -> Self {
        Self { success: false, message: message.into(), data: None, error: Some(error) }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProcessingResult<U> {
        ProcessingResult {
            success: self.success,
            message: self.message,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// Context handed to an `ErrorHandler` when a failure occurs, tracking the
/// retry chain's provenance.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub retry_count: u32,
    pub max_retries: u32,
    pub component: String,
    pub first_failure_time: DateTime<Utc>,
    pub last_failure_time: DateTime<Utc>,
    pub metadata: Metadata,
}

impl ErrorContext {
    pub fn first_failure(component: impl Into<String>, max_retries: u32, at: DateTime<Utc>) -> Self {
        Self {
            retry_count: 0,
            max_retries,
            component: component.into(),
            first_failure_time: at,
            last_failure_time: at,
            metadata: Metadata::new(),
        }
    }

    /// Advance the context to the next retry, preserving `first_failure_time`
    /// and bumping `last_failure_time` to `at`.
    pub fn advance(&mut self, at: DateTime<Utc>) {
        self.retry_count += 1;
        self.last_failure_time = at;
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// The disposition an `ErrorHandler` returns for a failed message.
#[derive(Debug, Clone)]
pub enum ErrorDecision {
    Retry(std::time::Duration),
    SendToDeadLetter(String),
    Discard(String),
    Escalate,
}

#[async_trait::async_trait]
pub trait ErrorHandler<M>: Send + Sync {
    async fn handle(
        &self,
        message: &M,
        error: &CourierError,
        context: &ErrorContext,
    ) -> ErrorDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_result_invariant() {
        let valid = ValidationResult::valid();
        assert!(valid.errors.is_empty());

        let invalid = ValidationResult::invalid(vec!["field required".into()]);
        assert!(!invalid.is_valid);
        assert_eq!(invalid.errors.len(), 1);
    }

    #[test]
    fn handler_error_with_transient_marker_is_transient() {
        let err = CourierError::HandlerError("downstream Timeout while calling service".into());
        assert!(err.is_transient());
        assert!(!err.is_critical());
    }

    #[test]
    fn critical_errors_are_never_transient() {
        let err = CourierError::CriticalError("OutOfMemory".into());
        assert!(err.is_critical());
        assert!(!err.is_transient());
    }

    #[test]
    fn error_context_preserves_first_failure_time_across_retries() {
        let t0 = Utc::now();
        let mut ctx = ErrorContext::first_failure("test", 3, t0);
        let t1 = t0 + chrono::Duration::seconds(1);
        ctx.advance(t1);
        let t2 = t1 + chrono::Duration::seconds(1);
        ctx.advance(t2);

        assert_eq!(ctx.first_failure_time, t0);
        assert_eq!(ctx.last_failure_time, t2);
        assert_eq!(ctx.retry_count, 2);
        assert!(!ctx.retries_exhausted());
    }
}
