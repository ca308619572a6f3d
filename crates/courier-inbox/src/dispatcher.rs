//! The dispatch seam an `InboxProcessor`'s background worker delegates to,
//! mirroring `courier-outbox::OutboxDispatcher`.

use async_trait::async_trait;
use courier_common::CourierError;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait InboxDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        message_type: &str,
        payload: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError>;
}
