//! SQLite-backed checkpoint store.
//!
//! Rows carry the persisted state as JSON plus enough metadata to rebuild
//! the thread tree. Rows whose timestamp fails to parse are skipped with a
//! warning rather than failing the whole history read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::persistence::PersistedState;
use super::store::{Checkpoint, CheckpointStore, StoreError};
use crate::state::RunState;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tracing::info!("sqlite checkpoint store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Decode one row; `Ok(None)` means the row is unusable and skipped.
    fn decode(row: &SqliteRow) -> Result<Option<Checkpoint>, StoreError> {
        let created_at_raw: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let created_at = match DateTime::parse_from_rfc3339(&created_at_raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(err) => {
                tracing::warn!(raw = %created_at_raw, error = %err, "skipping checkpoint row with malformed timestamp");
                return Ok(None);
            }
        };

        let state_json: String = row
            .try_get("state")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let persisted: PersistedState = serde_json::from_str(&state_json)?;
        let pending_json: String = row
            .try_get("pending_next")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let writes_json: String = row
            .try_get("writes")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let step: i64 = row
            .try_get("step")
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Some(Checkpoint {
            id: row
                .try_get("checkpoint_id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            thread_id: row
                .try_get("thread_id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            parent_id: row
                .try_get("parent_id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            state: RunState::from(persisted),
            producing_node: row
                .try_get("producing_node")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            pending_next: serde_json::from_str(&pending_json)?,
            writes: serde_json::from_str(&writes_json)?,
            step: step as u64,
            created_at,
        }))
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let exists =
            sqlx::query("SELECT 1 FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?")
                .bind(&checkpoint.thread_id)
                .bind(&checkpoint.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        if exists.is_some() {
            return Err(StoreError::Conflict {
                thread_id: checkpoint.thread_id,
                checkpoint_id: checkpoint.id,
            });
        }

        if let Some(parent_id) = &checkpoint.parent_id {
            let parent =
                sqlx::query("SELECT 1 FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?")
                    .bind(&checkpoint.thread_id)
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            if parent.is_none() {
                return Err(StoreError::MissingParent {
                    thread_id: checkpoint.thread_id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }

        let state_json = serde_json::to_string(&PersistedState::from(&checkpoint.state))?;
        sqlx::query(
            "INSERT INTO checkpoints \
             (thread_id, checkpoint_id, parent_id, producing_node, pending_next, writes, step, state, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.id)
        .bind(&checkpoint.parent_id)
        .bind(&checkpoint.producing_node)
        .bind(serde_json::to_string(&checkpoint.pending_next)?)
        .bind(serde_json::to_string(&checkpoint.writes)?)
        .bind(checkpoint.step as i64)
        .bind(state_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let row =
            sqlx::query("SELECT * FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?")
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        match row {
            Some(row) => Self::decode(&row),
            None => Ok(None),
        }
    }

    async fn head(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for row in &rows {
            if let Some(checkpoint) = Self::decode(row)? {
                return Ok(Some(checkpoint));
            }
        }
        Ok(None)
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut checkpoints = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(checkpoint) = Self::decode(row)? {
                checkpoints.push(checkpoint);
            }
        }
        Ok(checkpoints)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("thread_id")
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }
}
