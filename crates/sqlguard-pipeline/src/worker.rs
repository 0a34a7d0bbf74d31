//! Worker pool (spec §4.10 "Processing"/"Backpressure"/"Cancellation &
//! shutdown"). A bounded queue sits between the broker consumer and a fixed
//! pool of workers; each worker runs the audit checker bank sequentially per
//! event, persists the resulting `AuditReport`, and commits the broker
//! offset only after the write succeeds.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use sqlguard_audit::{AuditCheckerBank, AuditReport, CheckerResult};
use sqlguard_storage::{LogStore, MetadataStore};
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{error, info, warn};

use crate::{
    dlq::DeadLetterQueue,
    metrics::PipelineMetrics,
    transport::{DeliveredEvent, EventTransport},
};

/// Tunables for [`AuditWorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    /// Capacity of the bounded queue between consumer and workers. A full
    /// queue makes the consumer's enqueue call block (spec §4.10
    /// "Backpressure": "it does not drop events").
    pub queue_capacity: usize,
    pub max_attempts: u32,
    /// Upper bound on how long `shutdown` waits for in-flight work to drain.
    pub shutdown_deadline: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { worker_count: 4, queue_capacity: 1000, max_attempts: 3, shutdown_deadline: Duration::from_secs(30) }
    }
}

/// Fan-out pool: one bounded `mpsc` channel shared by `worker_count` tasks
/// behind a mutex-guarded receiver, mirroring how a single-receiver channel
/// is turned into a shared work queue without pulling in a separate crate.
pub struct AuditWorkerPool {
    config: WorkerPoolConfig,
    queue_tx: mpsc::Sender<DeliveredEvent>,
    queue_rx: Arc<AsyncMutex<mpsc::Receiver<DeliveredEvent>>>,
    checker_bank: Arc<AuditCheckerBank>,
    metadata_store: Arc<dyn MetadataStore>,
    log_store: Arc<dyn LogStore>,
    transport: Arc<dyn EventTransport>,
    dead_letter_queue: Arc<dyn DeadLetterQueue>,
    metrics: Arc<PipelineMetrics>,
    running: Arc<AtomicBool>,
    handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl AuditWorkerPool {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerPoolConfig,
        checker_bank: AuditCheckerBank,
        metadata_store: Arc<dyn MetadataStore>,
        log_store: Arc<dyn LogStore>,
        transport: Arc<dyn EventTransport>,
        dead_letter_queue: Arc<dyn DeadLetterQueue>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let metrics = Arc::new(PipelineMetrics::new(config.worker_count));
        Self {
            config,
            queue_tx,
            queue_rx: Arc::new(AsyncMutex::new(queue_rx)),
            checker_bank: Arc::new(checker_bank),
            metadata_store,
            log_store,
            transport,
            dead_letter_queue,
            metrics,
            running: Arc::new(AtomicBool::new(false)),
            handles: AsyncMutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Enqueue a delivered event. Blocks (applying backpressure to the
    /// caller — typically the broker consumer loop) when the queue is full.
    pub async fn enqueue(&self, event: DeliveredEvent) -> bool {
        self.queue_tx.send(event).await.is_ok()
    }

    /// Spawn `worker_count` worker tasks.
    pub async fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        let mut handles = self.handles.lock().await;
        for index in 0..self.config.worker_count {
            let queue_rx = Arc::clone(&self.queue_rx);
            let checker_bank = Arc::clone(&self.checker_bank);
            let metadata_store = Arc::clone(&self.metadata_store);
            let log_store = Arc::clone(&self.log_store);
            let transport = Arc::clone(&self.transport);
            let dead_letter_queue = Arc::clone(&self.dead_letter_queue);
            let worker_metrics = self.metrics.worker(index);
            let running = Arc::clone(&self.running);
            let max_attempts = self.config.max_attempts;

            let handle = tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = queue_rx.lock().await;
                        worker_metrics.set_queue_depth(rx.len());
                        rx.recv().await
                    };
                    let Some(delivered) = next else {
                        break;
                    };
                    process_one(
                        delivered,
                        &checker_bank,
                        &metadata_store,
                        &log_store,
                        &transport,
                        &dead_letter_queue,
                        &worker_metrics,
                        max_attempts,
                    )
                    .await;
                    if !running.load(Ordering::SeqCst) {
                        // Drain whatever is already queued, then stop taking
                        // more so shutdown's deadline wait terminates.
                        let mut rx = queue_rx.lock().await;
                        if rx.is_empty() {
                            break;
                        }
                    }
                }
            });
            handles.push(handle);
        }
    }

    /// Stop accepting new work and wait up to `shutdown_deadline` for queued
    /// work to drain (spec §4.10 "Cancellation & shutdown"). Anything left
    /// unprocessed past the deadline stays uncommitted — at-least-once
    /// redelivery retries it after restart.
    pub async fn shutdown(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        drop(self.queue_tx.clone()); // allow existing clones to close naturally on drop elsewhere
        let mut handles = self.handles.lock().await;
        let drain = async {
            for handle in handles.drain(..) {
                if let Err(err) = handle.await {
                    error!(error = %err, "worker task panicked during shutdown");
                }
            }
        };
        match timeout(self.config.shutdown_deadline, drain).await {
            Ok(()) => {
                info!("worker pool drained cleanly");
                true
            }
            Err(_) => {
                warn!("shutdown deadline exceeded with work still in flight");
                false
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_one(
    delivered: DeliveredEvent,
    checker_bank: &AuditCheckerBank,
    metadata_store: &Arc<dyn MetadataStore>,
    log_store: &Arc<dyn LogStore>,
    transport: &Arc<dyn EventTransport>,
    dead_letter_queue: &Arc<dyn DeadLetterQueue>,
    worker_metrics: &Arc<crate::metrics::WorkerMetrics>,
    max_attempts: u32,
) {
    let DeliveredEvent { event, offset_token } = delivered;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match run_once(&event, checker_bank, metadata_store, log_store).await {
            Ok(()) => {
                worker_metrics.record_processed();
                if let Err(err) = transport.commit(&offset_token).await {
                    warn!(error = %err, "offset commit failed after successful processing");
                }
                return;
            }
            Err(err) => {
                warn!(error = %err, attempt, sql_id = %event.sql_id, "audit event processing attempt failed");
                last_error = Some(err);
            }
        }
    }

    worker_metrics.record_failed();
    worker_metrics.record_dead_lettered();
    let reason = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown processing error".to_string());
    if let Err(err) = dead_letter_queue.push(event, reason, max_attempts).await {
        error!(error = %err, "failed to dead-letter audit event; it will be redelivered and retried");
    }
}

async fn run_once(
    event: &sqlguard_audit::AuditEvent,
    checker_bank: &AuditCheckerBank,
    metadata_store: &Arc<dyn MetadataStore>,
    log_store: &Arc<dyn LogStore>,
) -> crate::error::Result<()> {
    let checker_results: Vec<CheckerResult> = checker_bank.run(event);
    let report = AuditReport::new(event.clone(), checker_results, chrono::Utc::now());
    log_store.log(event).await?;
    metadata_store.upsert_report(&report).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlguard_core::SqlCommandType;

    use super::*;
    use crate::{dlq::InMemoryDeadLetterQueue, transport::InMemoryTransport};

    struct RecordingLogStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LogStore for RecordingLogStore {
        async fn log(&self, _event: &sqlguard_audit::AuditEvent) -> sqlguard_storage::Result<()> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn log_batch(&self, _events: &[sqlguard_audit::AuditEvent]) -> sqlguard_storage::Result<()> {
            Ok(())
        }
        async fn find_by_time_range(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> sqlguard_storage::Result<Vec<sqlguard_audit::AuditEvent>> {
            Ok(Vec::new())
        }
        async fn count_by_time_range(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> sqlguard_storage::Result<i64> {
            Ok(0)
        }
        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> sqlguard_storage::Result<u64> {
            Ok(0)
        }
    }

    struct RecordingMetadataStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataStore for RecordingMetadataStore {
        async fn upsert_report(&self, _report: &sqlguard_audit::AuditReport) -> sqlguard_storage::Result<()> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn find_by_sql_id(&self, _sql_id: &str) -> sqlguard_storage::Result<Vec<sqlguard_audit::AuditReport>> {
            Ok(Vec::new())
        }
        async fn find_by_statement_id(&self, _statement_id: &str) -> sqlguard_storage::Result<Vec<sqlguard_audit::AuditReport>> {
            Ok(Vec::new())
        }
        async fn load_checker_config(&self) -> sqlguard_storage::Result<sqlguard_core::CheckerConfigSet> {
            Ok(sqlguard_core::CheckerConfigSet::new())
        }
        async fn save_checker_config(&self, _config: &sqlguard_core::CheckerConfigSet) -> sqlguard_storage::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn enqueued_event_is_processed_and_persisted() {
        let log_store = Arc::new(RecordingLogStore { calls: AtomicUsize::new(0) });
        let metadata_store = Arc::new(RecordingMetadataStore { calls: AtomicUsize::new(0) });
        let transport = Arc::new(InMemoryTransport::new());
        let dlq = Arc::new(InMemoryDeadLetterQueue::new());

        let pool = AuditWorkerPool::new(
            WorkerPoolConfig { worker_count: 1, ..Default::default() },
            AuditCheckerBank::default_bank(),
            metadata_store.clone(),
            log_store.clone(),
            transport,
            dlq,
        );
        pool.start().await;

        let event = sqlguard_audit::AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        pool.enqueue(DeliveredEvent { event, offset_token: "mem:0".to_string() }).await;

        // Give the worker a tick to pick the item up before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;

        assert_eq!(log_store.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(metadata_store.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
