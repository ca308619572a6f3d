//! Task-local correlation context.
//!
//! Modeled as a task-local value rather than an ambient global, per the design
//! note that thread-local correlation state should be scoped to the logical
//! task it belongs to and guaranteed to clear on every exit path.

use tokio::task_local;

#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub message_id: String,
}

task_local! {
    static CURRENT: CorrelationContext;
}

/// Run `f` with `context` established as the current correlation context for
/// the duration of the future. The context is cleared automatically when the
/// future completes, including when it completes via panic unwinding.
pub async fn scope<F, Fut, T>(context: CorrelationContext, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    CURRENT.scope(context, f()).await
}

/// Read the current correlation id, if a scope is active.
pub fn current_correlation_id() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.correlation_id.clone()).ok()
}

/// Read the current message id, if a scope is active.
pub fn current_message_id() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.message_id.clone()).ok()
}

#[cfg(test)]
use futures::FutureExt;
