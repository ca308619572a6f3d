//! The three core processors: `CommandProcessor`, `QueryProcessor`, and
//! `EventBus`, plus the `HandlerRegistry` contract they resolve handlers
//! through and an in-memory reference registry.

pub mod command;
pub mod event_bus;
pub mod handlers;
pub mod query;
pub mod registry;

pub use command::CommandProcessor;
pub use event_bus::{EventBus, EventBusConfig};
pub use handlers::{CommandHandler, EventHandler, QueryHandler};
pub use query::QueryProcessor;
pub use registry::{DashMapRegistry, HandlerRegistry};
