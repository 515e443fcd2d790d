//! Task queue implementation using PostgreSQL.

use async_trait::async_trait;
use buildhook_core::task::{TaskName, TaskSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;

/// A queued task.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueuedTask {
    pub id: Uuid,
    pub task_name: String,
    pub payload: Json<Value>,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn name(&self) -> Result<TaskName, String> {
        self.task_name.parse()
    }
}

/// Where workers get their tasks from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Claim the oldest pending task with one of the given names.
    async fn claim(&self, worker_id: &str, tasks: &[TaskName])
    -> Result<Option<QueuedTask>, QueueError>;

    async fn complete(&self, task_id: Uuid, result: &Value) -> Result<(), QueueError>;

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Put tasks claimed before `claimed_before` back to pending.
    ///
    /// Returns how many tasks were released.
    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, QueueError>;
}

/// Task queue backed by PostgreSQL.
pub struct TaskQueue {
    pool: PgPool,
}

impl TaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a new task.
    pub async fn push(&self, task: TaskName, payload: Value) -> Result<QueuedTask, QueueError> {
        let queued = sqlx::query_as::<_, QueuedTask>(
            r#"
            INSERT INTO task_queue (id, task_name, payload, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            RETURNING id, task_name, payload, status, attempts, last_error,
                      claimed_by, claimed_at, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(task.to_string())
        .bind(Json(payload))
        .fetch_one(&self.pool)
        .await?;
        debug!(task_id = %queued.id, task = %task, "Task enqueued");
        Ok(queued)
    }
}

#[async_trait]
impl TaskSource for TaskQueue {
    /// Uses SKIP LOCKED to prevent contention between workers.
    async fn claim(
        &self,
        worker_id: &str,
        tasks: &[TaskName],
    ) -> Result<Option<QueuedTask>, QueueError> {
        let names: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
        let task = sqlx::query_as::<_, QueuedTask>(
            r#"
            UPDATE task_queue
            SET status = 'claimed', claimed_by = $1, claimed_at = NOW(), attempts = attempts + 1
            WHERE id = (
                SELECT id FROM task_queue
                WHERE status = 'pending' AND task_name = ANY($2)
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, task_name, payload, status, attempts, last_error,
                      claimed_by, claimed_at, created_at
            "#,
        )
        .bind(worker_id)
        .bind(names)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn complete(&self, task_id: Uuid, result: &Value) -> Result<(), QueueError> {
        sqlx::query("UPDATE task_queue SET status = 'completed', result = $2 WHERE id = $1")
            .bind(task_id)
            .bind(Json(result))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError> {
        sqlx::query("UPDATE task_queue SET status = 'failed', last_error = $2 WHERE id = $1")
            .bind(task_id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE task_queue
            SET status = 'pending', claimed_by = NULL, claimed_at = NULL
            WHERE status = 'claimed' AND claimed_at < $1
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskSink for TaskQueue {
    async fn enqueue(&self, task: TaskName, payload: Value) -> buildhook_core::Result<()> {
        self.push(task, payload).await?;
        Ok(())
    }
}
