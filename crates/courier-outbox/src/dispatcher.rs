//! The dispatch seam an `OutboxProcessor` delegates to: given an entry's
//! runtime message type, route it to the right processor (command handler,
//! event bus, ...). The processor itself owns no knowledge of those types.

use async_trait::async_trait;
use courier_common::CourierError;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait OutboxDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        message_type: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError>;
}
