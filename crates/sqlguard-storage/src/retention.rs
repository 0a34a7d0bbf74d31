//! Retention job (spec §4.12): periodically drops audit log rows older than
//! the configured window. Runs on a `cron` schedule rather than a fixed
//! interval so operators can pin it to an off-peak hour.

use std::{str::FromStr, sync::Arc};

use chrono::Utc;
use cron::Schedule;
use tracing::{error, info, warn};

use crate::log_store::LogStore;

/// Configuration for the retention sweep.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Standard 5-field cron expression, e.g. `"0 0 3 * * *"` for 3am daily.
    pub schedule: String,
    pub retention_days: i64,
    pub max_retries: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { schedule: "0 0 3 * * *".to_string(), retention_days: 90, max_retries: 3 }
    }
}

/// Runs the configured log store's `delete_older_than` on each tick of the
/// cron schedule. A failed sweep is logged and retried on the next tick
/// rather than retried in a tight loop — a stuck backend should not spin.
pub struct RetentionJob {
    config: RetentionConfig,
    log_store: Arc<dyn LogStore>,
}

impl RetentionJob {
    pub fn new(config: RetentionConfig, log_store: Arc<dyn LogStore>) -> Result<Self, cron::error::Error> {
        Schedule::from_str(&config.schedule)?;
        Ok(Self { config, log_store })
    }

    /// Run forever, sweeping on every cron tick. Intended to be spawned as
    /// its own task; never returns unless the schedule itself is malformed.
    pub async fn run(&self) {
        let schedule = match Schedule::from_str(&self.config.schedule) {
            Ok(schedule) => schedule,
            Err(err) => {
                error!(error = %err, schedule = %self.config.schedule, "retention schedule is invalid, job will not run");
                return;
            }
        };

        for next in schedule.upcoming(Utc) {
            let now = Utc::now();
            if next > now {
                let wait = next - now;
                if let Ok(duration) = wait.to_std() {
                    tokio::time::sleep(duration).await;
                }
            }
            self.sweep_once().await;
        }
    }

    /// One retention sweep with bounded retry. Public so callers (and tests)
    /// can trigger it outside the cron loop.
    pub async fn sweep_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        for attempt in 1..=self.config.max_retries {
            match self.log_store.delete_older_than(cutoff).await {
                Ok(deleted) => {
                    info!(deleted, cutoff = %cutoff, attempt, "retention sweep complete");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, attempt, "retention sweep failed");
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(std::time::Duration::from_secs(2_u64.pow(attempt as u32))).await;
                    }
                }
            }
        }
        error!(cutoff = %cutoff, "retention sweep exhausted retries, will try again on next tick");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use sqlguard_audit::AuditEvent;

    struct CountingLogStore {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl LogStore for CountingLogStore {
        async fn log(&self, _event: &AuditEvent) -> crate::error::Result<()> {
            Ok(())
        }
        async fn log_batch(&self, _events: &[AuditEvent]) -> crate::error::Result<()> {
            Ok(())
        }
        async fn find_by_time_range(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> crate::error::Result<Vec<AuditEvent>> {
            Ok(Vec::new())
        }
        async fn count_by_time_range(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> crate::error::Result<i64> {
            Ok(0)
        }
        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> crate::error::Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(crate::error::StorageError::Unavailable("simulated outage".to_string()));
            }
            Ok(7)
        }
    }

    #[tokio::test]
    async fn sweep_retries_until_success() {
        let store = Arc::new(CountingLogStore { calls: AtomicUsize::new(0), fail_first: 2 });
        let job = RetentionJob::new(RetentionConfig { max_retries: 5, ..Default::default() }, store.clone()).unwrap();
        job.sweep_once().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn invalid_schedule_is_rejected_at_construction() {
        let store = Arc::new(CountingLogStore { calls: AtomicUsize::new(0), fail_first: 0 });
        let config = RetentionConfig { schedule: "not a cron expression".to_string(), ..Default::default() };
        assert!(RetentionJob::new(config, store).is_err());
    }
}
