//! Durable offset/checkpoint tracking (spec §4.10 "Ingress": "Offsets are
//! committed after a batch is fully processed").

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// Checkpoint state for one consumer group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub consumer_id: String,
    pub offset_token: String,
    pub committed_at: DateTime<Utc>,
    pub batch_size: usize,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, consumer_id: &str) -> Result<Option<CheckpointState>>;
    async fn save(&self, consumer_id: &str, state: &CheckpointState) -> Result<()>;
    async fn delete(&self, consumer_id: &str) -> Result<()>;
}

/// In-memory checkpoint store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: Mutex<HashMap<String, CheckpointState>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, consumer_id: &str) -> Result<Option<CheckpointState>> {
        Ok(self.states.lock().unwrap().get(consumer_id).cloned())
    }

    async fn save(&self, consumer_id: &str, state: &CheckpointState) -> Result<()> {
        self.states.lock().unwrap().insert(consumer_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, consumer_id: &str) -> Result<()> {
        self.states.lock().unwrap().remove(consumer_id);
        Ok(())
    }
}

/// PostgreSQL-backed checkpoint store — durable across restarts.
#[derive(Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pipeline_checkpoints (
                consumer_id TEXT PRIMARY KEY,
                offset_token TEXT NOT NULL,
                committed_at TIMESTAMPTZ NOT NULL,
                batch_size INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, consumer_id: &str) -> Result<Option<CheckpointState>> {
        let record = sqlx::query_as::<_, (String, String, DateTime<Utc>, i32)>(
            "SELECT consumer_id, offset_token, committed_at, batch_size FROM pipeline_checkpoints WHERE consumer_id = $1",
        )
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(|(consumer_id, offset_token, committed_at, batch_size)| CheckpointState {
            consumer_id,
            offset_token,
            committed_at,
            batch_size: batch_size as usize,
        }))
    }

    async fn save(&self, consumer_id: &str, state: &CheckpointState) -> Result<()> {
        #[allow(clippy::cast_possible_wrap)]
        sqlx::query(
            "INSERT INTO pipeline_checkpoints (consumer_id, offset_token, committed_at, batch_size)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (consumer_id) DO UPDATE SET
                offset_token = EXCLUDED.offset_token,
                committed_at = EXCLUDED.committed_at,
                batch_size = EXCLUDED.batch_size",
        )
        .bind(consumer_id)
        .bind(&state.offset_token)
        .bind(state.committed_at)
        .bind(state.batch_size as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, consumer_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pipeline_checkpoints WHERE consumer_id = $1").bind(consumer_id).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_state() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("consumer-a").await.unwrap().is_none());

        let state = CheckpointState { consumer_id: "consumer-a".to_string(), offset_token: "topic:0:42".to_string(), committed_at: Utc::now(), batch_size: 100 };
        store.save("consumer-a", &state).await.unwrap();
        let loaded = store.load("consumer-a").await.unwrap().unwrap();
        assert_eq!(loaded.offset_token, "topic:0:42");

        store.delete("consumer-a").await.unwrap();
        assert!(store.load("consumer-a").await.unwrap().is_none());
    }
}
