//! Wires the config-loaded settings into a running audit pipeline +
//! retention job (spec §2 "Audit Pipeline" data flow, §4.10, §4.12).
//!
//! The validation engine itself (spec §4.1-§4.7) is a library surface
//! embedded directly into a host process at its hook points — this binary
//! only runs the asynchronous half of the platform.

use std::sync::Arc;

use sqlguard_pipeline::{
    AuditPipeline, AuditWorkerPool, BrokerAuditWriter, BrokerDeadLetterQueue, InMemoryCheckpointStore, KafkaTransport, WorkerPoolConfig,
};
use sqlguard_storage::{build as build_storage, RetentionConfig, RetentionJob};
use tracing::info;

use crate::{config::SqlGuardConfig, error::Result};

/// Everything the running process needs to hold onto for graceful shutdown.
pub struct Running {
    pipeline: Arc<AuditPipeline>,
    consumer_handle: tokio::task::JoinHandle<()>,
    retention_handle: tokio::task::JoinHandle<()>,
}

impl Running {
    /// Stop the consumer, drain workers within their deadline, and abort the
    /// retention job's scheduling loop (spec §4.10 "Cancellation & shutdown").
    pub async fn shutdown(self) {
        info!("shutting down audit pipeline");
        let drained = self.pipeline.shutdown(self.consumer_handle).await;
        if !drained {
            tracing::warn!("worker pool did not drain within its deadline; unacknowledged events will be redelivered");
        }
        self.retention_handle.abort();
    }
}

/// Build and start the audit pipeline and retention job from `config`.
pub async fn start(config: &SqlGuardConfig) -> Result<Running> {
    let (metadata_store, log_store) = build_storage(config.audit.storage.mode, &config.storage_config()).await?;
    info!(mode = ?config.audit.storage.mode, "storage adapters ready");

    let transport = Arc::new(KafkaTransport::new(&config.audit.broker.brokers, &config.audit.broker.group, config.audit.broker.topic.clone())?);
    let dead_letter_queue = Arc::new(BrokerDeadLetterQueue::new(Arc::clone(&transport) as _));
    let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());

    let worker_pool = Arc::new(AuditWorkerPool::new(
        WorkerPoolConfig { worker_count: config.audit.broker.workers, ..Default::default() },
        sqlguard_audit::AuditCheckerBank::default_bank(),
        metadata_store,
        log_store.clone(),
        Arc::clone(&transport) as _,
        dead_letter_queue,
    ));

    let pipeline = Arc::new(AuditPipeline::new(config.audit.broker.group.clone(), Arc::clone(&transport) as _, worker_pool, checkpoint_store));
    let consumer_handle = Arc::clone(&pipeline).start().await;
    info!(workers = config.audit.broker.workers, topic = %config.audit.broker.topic, "audit pipeline started");

    let retention_job = RetentionJob::new(
        RetentionConfig { schedule: config.audit.storage.retention.cron.clone(), retention_days: config.audit.storage.retention_days, max_retries: 3 },
        log_store,
    )?;
    let retention_handle = tokio::spawn(async move { retention_job.run().await });
    info!(cron = %config.audit.storage.retention.cron, retention_days = config.audit.storage.retention_days, "retention job scheduled");

    // `BrokerAuditWriter` is the sink host adapters hand `AuditEvent`s to
    // (spec §4.8); this binary only needs to know it compiles against the
    // same transport the consumer reads from.
    let _ = BrokerAuditWriter::new(transport);

    Ok(Running { pipeline, consumer_handle, retention_handle })
}
