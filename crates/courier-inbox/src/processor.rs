//! `InboxProcessor`: deduplicated acceptance of incoming messages plus a
//! background worker that drains unprocessed entries and a periodic cleanup
//! task bounding storage growth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_common::{CourierError, InMemoryMetricsCollector, MetricsCollector};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::dispatcher::InboxDispatcher;
use crate::entry::{InboxEntry, InboxOptions};
use crate::storage::InboxStorage;

#[derive(Debug, Clone)]
pub struct InboxProcessorConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

impl Default for InboxProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            cleanup_interval: Duration::from_secs(3600),
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

pub struct InboxProcessor<S: InboxStorage, D: InboxDispatcher> {
    storage: Arc<S>,
    dispatcher: Arc<D>,
    config: InboxProcessorConfig,
    metrics: Arc<InMemoryMetricsCollector>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cleanup_worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S, D> InboxProcessor<S, D>
where
    S: InboxStorage + 'static,
    D: InboxDispatcher + 'static,
{
    pub fn new(storage: Arc<S>, dispatcher: Arc<D>, config: InboxProcessorConfig) -> Self {
        Self {
            storage,
            dispatcher,
            config,
            metrics: Arc::new(InMemoryMetricsCollector::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            cleanup_worker: Mutex::new(None),
        }
    }

    /// Persists `message` unless it is judged a duplicate. Returns `true` on
    /// acceptance, `false` on duplicate or storage-level rejection.
    pub async fn process_incoming<T: Serialize>(
        &self,
        message_id: impl Into<String>,
        message_type: impl Into<String>,
        message: &T,
        options: Option<InboxOptions>,
    ) -> Result<bool, CourierError> {
        let options = options.unwrap_or_default();
        let message_id = message_id.into();
        let message_type = message_type.into();

        if options.require_idempotency && self.storage.is_duplicate(&message_id, options.deduplication_window).await? {
            warn!(message_id = %message_id, "duplicate message rejected");
            return Ok(false);
        }

        let payload = serde_json::to_value(message)
            .map_err(|e| CourierError::ArgumentError(format!("message is not serializable: {e}")))?;
        let entry = InboxEntry::new(message_id.clone(), message_type, payload);

        match self.storage.add(entry).await? {
            Some(_) => Ok(true),
            None => {
                warn!(message_id = %message_id, "storage rejected message as a duplicate");
                Ok(false)
            }
        }
    }

    pub async fn get_unprocessed_count(&self) -> Result<usize, CourierError> {
        self.storage.get_unprocessed_count().await
    }

    pub fn start(&self, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let storage = self.storage.clone();
        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let running = self.running.clone();
        let worker_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = worker_cancel.cancelled() => break,
                }

                match storage.get_unprocessed(config.batch_size).await {
                    Ok(batch) => {
                        for entry in batch {
                            if worker_cancel.is_cancelled() {
                                break;
                            }
                            let result = dispatcher.dispatch(&entry.message_type, &entry.payload, &worker_cancel).await;
                            match result {
                                Ok(()) => {
                                    if let Err(err) = storage.mark_processed(entry.id).await {
                                        error!(entry_id = %entry.id, error = %err, "failed to mark inbox entry processed");
                                    }
                                    metrics.increment("inbox.processed", 1);
                                }
                                Err(err) => {
                                    error!(entry_id = %entry.id, error = %err, "inbox dispatch failed");
                                    metrics.increment("inbox.failed", 1);
                                }
                            }
                        }
                    }
                    Err(err) => error!(error = %err, "failed to fetch unprocessed inbox entries"),
                }
            }

            running.store(false, Ordering::SeqCst);
            debug!("inbox worker stopped");
        });
        *self.worker.lock() = Some(handle);

        let cleanup_storage = self.storage.clone();
        let cleanup_config = self.config.clone();
        let cleanup_cancel = cancel;
        let cleanup_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(cleanup_config.cleanup_interval) => {}
                    _ = cleanup_cancel.cancelled() => break,
                }
                match cleanup_storage.cleanup_old_entries(cleanup_config.retention).await {
                    Ok(removed) if removed > 0 => debug!(removed, "cleaned up stale inbox entries"),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "inbox cleanup failed"),
                }
            }
        });
        *self.cleanup_worker.lock() = Some(cleanup_handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        if let Some(handle) = self.cleanup_worker.lock().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn processed_messages(&self) -> u64 {
        self.metrics.get_counter("inbox.processed")
    }

    pub fn failed_messages(&self) -> u64 {
        self.metrics.get_counter("inbox.failed")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    use async_trait::async_trait;

    use super::*;
    use crate::storage::InMemoryInboxStorage;

    struct RecordingDispatcher {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl InboxDispatcher for RecordingDispatcher {
        async fn dispatch(&self, _message_type: &str, _payload: &serde_json::Value, _cancel: &CancellationToken) -> Result<(), CourierError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn process_incoming_rejects_duplicate_within_window() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let dispatcher = Arc::new(RecordingDispatcher { calls: Arc::new(AtomicU32::new(0)) });
        let processor = InboxProcessor::new(storage, dispatcher, InboxProcessorConfig::default());

        let accepted = processor.process_incoming("msg-1", "Foo", &serde_json::json!({}), None).await.unwrap();
        assert!(accepted);

        let rejected = processor.process_incoming("msg-1", "Foo", &serde_json::json!({}), None).await.unwrap();
        assert!(!rejected);
    }

    #[tokio::test]
    async fn background_worker_drains_unprocessed_entries() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let calls = Arc::new(AtomicU32::new(0));
        let dispatcher = Arc::new(RecordingDispatcher { calls: calls.clone() });
        let processor = InboxProcessor::new(
            storage,
            dispatcher,
            InboxProcessorConfig { poll_interval: Duration::from_millis(10), ..Default::default() },
        );

        processor.process_incoming("msg-1", "Foo", &serde_json::json!({}), None).await.unwrap();
        assert_eq!(processor.get_unprocessed_count().await.unwrap(), 1);

        let cancel = CancellationToken::new();
        processor.start(cancel.clone());

        for _ in 0..50 {
            if processor.processed_messages() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(processor.processed_messages(), 1);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(processor.get_unprocessed_count().await.unwrap(), 0);

        cancel.cancel();
        processor.stop().await;
        assert!(!processor.is_running());
    }
}
