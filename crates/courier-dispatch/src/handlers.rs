//! Handler contracts consumed by the three processors. A handler is the
//! innermost unit of work a pipeline invokes once validation, retry, and the
//! rest of the decorator catalog have run.

use async_trait::async_trait;
use courier_common::{Command, CourierError, Event, Query};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C, cancel: &CancellationToken) -> Result<C::Response, CourierError>;
}

#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(&self, query: Q, cancel: &CancellationToken) -> Result<Q::Response, CourierError>;
}

#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    async fn handle(&self, event: E, cancel: &CancellationToken) -> Result<(), CourierError>;

    /// The concrete handler's type name, used to populate `ErrorContext`
    /// metadata for the event bus's per-handler dispatch loop.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
