//! The external-facing registry contract the core consumes: exactly one
//! handler for a command or query type, zero or more for an event type.
//! `DashMapRegistry` is the in-memory reference implementation the demo and
//! tests register handlers into.

use std::any::{Any, TypeId};
use std::sync::Arc;

use courier_common::{Command, Event, Query};
use dashmap::DashMap;

use crate::handlers::{CommandHandler, EventHandler, QueryHandler};

/// Resolution surface a `CommandProcessor`/`QueryProcessor`/`EventBus` is
/// generic over. Methods are generic rather than trait-object dispatched, so
/// this is used as a type bound (`Reg: HandlerRegistry`), not a `dyn` object.
pub trait HandlerRegistry: Send + Sync {
    fn resolve_command<C: Command>(&self) -> Option<Arc<dyn CommandHandler<C>>>;
    fn resolve_query<Q: Query>(&self) -> Option<Arc<dyn QueryHandler<Q>>>;
    fn resolve_events<E: Event>(&self) -> Vec<Arc<dyn EventHandler<E>>>;
}

/// In-memory registry keyed by `TypeId`, backed by `dashmap` for lock-free
/// concurrent resolution while handlers are registered once at startup and
/// read on every dispatch thereafter.
#[derive(Default)]
pub struct DashMapRegistry {
    commands: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
    queries: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
    events: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl DashMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command<C: Command>(&self, handler: Arc<dyn CommandHandler<C>>) {
        self.commands.insert(TypeId::of::<C>(), Box::new(handler));
    }

    pub fn register_query<Q: Query>(&self, handler: Arc<dyn QueryHandler<Q>>) {
        self.queries.insert(TypeId::of::<Q>(), Box::new(handler));
    }

    /// Registers an additional handler for event type `E`. Multiple handlers
    /// may be registered for the same event type; all of them are returned by
    /// `resolve_events`.
    pub fn register_event<E: Event>(&self, handler: Arc<dyn EventHandler<E>>) {
        let mut entry = self
            .events
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn EventHandler<E>>>::new()));
        let handlers = entry
            .downcast_mut::<Vec<Arc<dyn EventHandler<E>>>>()
            .expect("event handler list type mismatch for TypeId");
        handlers.push(handler);
    }
}

impl HandlerRegistry for DashMapRegistry {
    fn resolve_command<C: Command>(&self) -> Option<Arc<dyn CommandHandler<C>>> {
        self.commands
            .get(&TypeId::of::<C>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn CommandHandler<C>>>().cloned())
    }

    fn resolve_query<Q: Query>(&self) -> Option<Arc<dyn QueryHandler<Q>>> {
        self.queries
            .get(&TypeId::of::<Q>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn QueryHandler<Q>>>().cloned())
    }

    fn resolve_events<E: Event>(&self) -> Vec<Arc<dyn EventHandler<E>>> {
        self.events
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.downcast_ref::<Vec<Arc<dyn EventHandler<E>>>>().cloned())
            .unwrap_or_default()
    }
}
