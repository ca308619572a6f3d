//! `OutboxProcessor`: durably appends outbox entries and drains them on a
//! background worker with retry/backoff, honoring a priority threshold for
//! immediate polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_common::{CourierError, InMemoryMetricsCollector, MetricsCollector};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::dispatcher::OutboxDispatcher;
use crate::entry::{OutboxEntry, OutboxOptions};
use crate::storage::OutboxStorage;

#[derive(Debug, Clone)]
pub struct OutboxProcessorConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Entries with `priority` at or above this threshold wake the
    /// background worker immediately instead of waiting for the next tick.
    pub immediate_poll_priority: u8,
    pub max_backoff: Duration,
}

impl Default for OutboxProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            immediate_poll_priority: 5,
            max_backoff: Duration::from_secs(300),
        }
    }
}

pub struct OutboxProcessor<S: OutboxStorage, D: OutboxDispatcher> {
    storage: Arc<S>,
    dispatcher: Arc<D>,
    config: OutboxProcessorConfig,
    metrics: Arc<InMemoryMetricsCollector>,
    running: Arc<AtomicBool>,
    poll_signal: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_processed_time: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
}

impl<S, D> OutboxProcessor<S, D>
where
    S: OutboxStorage + 'static,
    D: OutboxDispatcher + 'static,
{
    pub fn new(storage: Arc<S>, dispatcher: Arc<D>, config: OutboxProcessorConfig) -> Self {
        Self {
            storage,
            dispatcher,
            config,
            metrics: Arc::new(InMemoryMetricsCollector::new()),
            running: Arc::new(AtomicBool::new(false)),
            poll_signal: Arc::new(Notify::new()),
            worker: Mutex::new(None),
            last_processed_time: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn publish_to_outbox<T: Serialize>(
        &self,
        message_type: impl Into<String>,
        message: &T,
        options: Option<OutboxOptions>,
    ) -> Result<Uuid, CourierError> {
        let options = options.unwrap_or_default();
        let payload = serde_json::to_value(message)
            .map_err(|e| CourierError::ArgumentError(format!("message is not serializable: {e}")))?;

        let entry = OutboxEntry::new(message_type, payload, &options);
        let id = entry.id;
        let priority = entry.priority;
        self.storage.append(entry).await?;

        if priority >= self.config.immediate_poll_priority {
            self.poll_signal.notify_one();
        }

        Ok(id)
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
        let poll_signal = self.poll_signal.clone();
        let last_processed_time_task = self.last_processed_time.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = poll_signal.notified() => {}
                    _ = cancel.cancelled() => break,
                }

                if cancel.is_cancelled() {
                    break;
                }

                match storage.get_pending(config.batch_size).await {
                    Ok(batch) => {
                        for entry in batch {
                            if cancel.is_cancelled() {
                                break;
                            }
                            process_entry(&*storage, &*dispatcher, &metrics, &config, entry, &cancel).await;
                            *last_processed_time_task.lock() = Some(Utc::now());
                        }
                    }
                    Err(err) => error!(error = %err, "failed to fetch pending outbox entries"),
                }
            }

            running.store(false, Ordering::SeqCst);
            debug!("outbox worker stopped");
        });

        *self.worker.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.poll_signal.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn pending_messages(&self) -> Result<usize, CourierError> {
        self.storage.pending_count().await
    }

    pub fn processed_messages(&self) -> u64 {
        self.metrics.get_counter("outbox.processed")
    }

    pub fn failed_messages(&self) -> u64 {
        self.metrics.get_counter("outbox.failed")
    }

    pub fn last_processed_time(&self) -> Option<chrono::DateTime<Utc>> {
        *self.last_processed_time.lock()
    }
}

async fn process_entry<S: OutboxStorage, D: OutboxDispatcher>(
    storage: &S,
    dispatcher: &D,
    metrics: &InMemoryMetricsCollector,
    config: &OutboxProcessorConfig,
    entry: OutboxEntry,
    cancel: &CancellationToken,
) {
    let result = dispatcher.dispatch(&entry.message_type, &entry.payload, cancel).await;

    match result {
        Ok(()) => {
            if let Err(err) = storage.mark_processed(entry.id).await {
                error!(entry_id = %entry.id, error = %err, "failed to mark outbox entry processed");
            }
            metrics.increment("outbox.processed", 1);
        }
        Err(err) => {
            if entry.retry_count < entry.max_retries {
                let backoff_secs = 2u64.saturating_pow(entry.retry_count).min(config.max_backoff.as_secs());
                let next_retry_at = Utc::now() + chrono::Duration::seconds(backoff_secs as i64);
                warn!(entry_id = %entry.id, retry_count = entry.retry_count, error = %err, "outbox entry failed, scheduling retry");
                if let Err(store_err) = storage.update_retry_count(entry.id, entry.retry_count + 1, next_retry_at).await {
                    error!(entry_id = %entry.id, error = %store_err, "failed to update outbox retry count");
                }
            } else {
                error!(entry_id = %entry.id, error = %err, "outbox entry exhausted retries");
                if let Err(store_err) = storage.mark_failed(entry.id, err.to_string()).await {
                    error!(entry_id = %entry.id, error = %store_err, "failed to mark outbox entry failed");
                }
                metrics.increment("outbox.failed", 1);
            }
        }
    }
}
