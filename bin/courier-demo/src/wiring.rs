//! Bridges the outbox/inbox background workers to the command processor and
//! event bus, the seam `OutboxDispatcher`/`InboxDispatcher` exist for.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::CourierError;
use courier_dispatch::{CommandProcessor, DashMapRegistry, EventBus};
use courier_inbox::InboxDispatcher;
use courier_outbox::OutboxDispatcher;
use tokio_util::sync::CancellationToken;

use crate::domain::{CreateOrder, OrderCreated};

/// Routes outbox entries back into the in-process command processor by
/// message type. A production deployment would more likely have one
/// dispatcher per bounded context forwarding over a message broker; this
/// demo keeps everything in one process to exercise the full round trip.
pub struct CommandOutboxDispatcher {
    pub create_order: Arc<CommandProcessor<CreateOrder, DashMapRegistry>>,
}

#[async_trait]
impl OutboxDispatcher for CommandOutboxDispatcher {
    async fn dispatch(
        &self,
        message_type: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        match message_type {
            "CreateOrder" => {
                let command: CreateOrder = serde_json::from_value(payload.clone())
                    .map_err(|e| CourierError::ArgumentError(format!("malformed CreateOrder payload: {e}")))?;
                self.create_order.send(Some(command), cancel).await?;
                Ok(())
            }
            other => Err(CourierError::NoHandlerFound(other.to_string())),
        }
    }
}

/// Routes inbox entries into the event bus by message type.
pub struct EventInboxDispatcher {
    pub event_bus: Arc<EventBus<DashMapRegistry>>,
}

#[async_trait]
impl InboxDispatcher for EventInboxDispatcher {
    async fn dispatch(
        &self,
        message_type: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        match message_type {
            "OrderCreated" => {
                let event: OrderCreated = serde_json::from_value(payload.clone())
                    .map_err(|e| CourierError::ArgumentError(format!("malformed OrderCreated payload: {e}")))?;
                self.event_bus.publish(Some(event), cancel).await
            }
            other => Err(CourierError::NoHandlerFound(other.to_string())),
        }
    }
}
