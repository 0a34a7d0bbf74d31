//! Orchestrator tying broker ingress, the worker pool, checkpointing, and
//! the dead-letter queue together into one runnable pipeline (spec §4.10).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    checkpoint::{CheckpointState, CheckpointStore},
    transport::EventTransport,
    worker::AuditWorkerPool,
};

/// Runs the consumer loop: pull from the transport, hand to the worker pool,
/// record the checkpoint. Exactly one instance should run per consumer
/// group member (spec §5: "Consumer pool of fixed size pulls from the
/// broker").
pub struct AuditPipeline {
    consumer_id: String,
    transport: Arc<dyn EventTransport>,
    worker_pool: Arc<AuditWorkerPool>,
    checkpoint_store: Arc<dyn CheckpointStore>,
}

impl AuditPipeline {
    #[must_use]
    pub fn new(consumer_id: impl Into<String>, transport: Arc<dyn EventTransport>, worker_pool: Arc<AuditWorkerPool>, checkpoint_store: Arc<dyn CheckpointStore>) -> Self {
        Self { consumer_id: consumer_id.into(), transport, worker_pool, checkpoint_store }
    }

    /// Start the worker pool and spawn the consumer loop. Returns a handle
    /// the caller can await during shutdown.
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.worker_pool.start().await;
        let pipeline = Arc::clone(&self);
        tokio::spawn(async move { pipeline.run_consumer_loop().await })
    }

    async fn run_consumer_loop(&self) {
        if let Ok(Some(checkpoint)) = self.checkpoint_store.load(&self.consumer_id).await {
            info!(consumer_id = %self.consumer_id, offset_token = %checkpoint.offset_token, "resuming from checkpoint");
        }

        let mut processed_since_checkpoint = 0usize;
        loop {
            match self.transport.recv().await {
                Ok(delivered) => {
                    let offset_token = delivered.offset_token.clone();
                    if !self.worker_pool.enqueue(delivered).await {
                        warn!("worker pool queue closed, stopping consumer loop");
                        break;
                    }
                    processed_since_checkpoint += 1;
                    if processed_since_checkpoint >= 100 {
                        let state = CheckpointState { consumer_id: self.consumer_id.clone(), offset_token, committed_at: chrono::Utc::now(), batch_size: processed_since_checkpoint };
                        if let Err(err) = self.checkpoint_store.save(&self.consumer_id, &state).await {
                            error!(error = %err, "failed to persist checkpoint");
                        }
                        processed_since_checkpoint = 0;
                    }
                }
                Err(err) => {
                    error!(error = %err, "broker receive failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Graceful shutdown (spec §4.10 "Cancellation & shutdown"): stop the
    /// consumer, drain workers within their deadline, then the caller is
    /// responsible for committing any final checkpoint via the transport's
    /// own commit semantics (already invoked per-event by the worker pool).
    pub async fn shutdown(&self, consumer_handle: JoinHandle<()>) -> bool {
        consumer_handle.abort();
        self.worker_pool.shutdown().await
    }
}
