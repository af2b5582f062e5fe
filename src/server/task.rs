//! Task store and background queue (C7, spec §4.7).
//!
//! A [`Task`] row is the durable view a client polls; the three named
//! queues (`upload`, `files`, `metadata`) are Redis lists a worker pool
//! drains. The two can disagree if a worker crashes mid-job: a claim key
//! set for the duration of [`JobHandler::handle`][crate::server::worker::JobHandler::handle]
//! tells a reader apart a job that's genuinely still running from one
//! whose worker died without calling `mark_done`/`mark_error`, so
//! [`TaskStore::get_reconciled`] only has to fall back to the row's own
//! age when no worker ever claimed it at all.

use std::time::Duration;

use pifs_api_types::{Task, TaskError, TaskId, TaskStatus};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub const QUEUE_UPLOAD: &str = "upload";
pub const QUEUE_FILES: &str = "files";
pub const QUEUE_METADATA: &str = "metadata";

/// Large on purpose: workers can run for hours extracting archives or
/// walking huge trees (spec §4.7).
pub const JOB_TIMEOUT: Duration = Duration::from_secs(12 * 3600);
pub const JOB_FAILED_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub struct TaskStore {
    db: PgPool,
    redis: redis::Client,
}

/// A unit of background work, serialised onto one of the three queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_id: TaskId,
    pub project_id: String,
    pub payload: serde_json::Value,
}

impl TaskStore {
    pub fn new(db: PgPool, redis_url: &str) -> Result<Self, TaskStoreError> {
        Ok(TaskStore {
            db,
            redis: redis::Client::open(redis_url)?,
        })
    }

    pub async fn create(&self, task: &Task) -> Result<(), TaskStoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, status, message, errors, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&task.id)
        .bind(&task.project_id)
        .bind(task.status)
        .bind(&task.message)
        .bind(serde_json::to_value(&task.errors)?)
        .bind(task.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Pushes `job` onto `queue_name` for a worker to pick up.
    pub async fn enqueue(&self, queue_name: &str, job: &Job) -> Result<(), TaskStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        let _: () = conn.rpush(Self::queue_key(queue_name), payload).await?;
        Ok(())
    }

    /// Blocks up to `timeout` waiting for a job; used by the worker pool.
    pub async fn dequeue(
        &self,
        queue_name: &str,
        timeout: Duration,
    ) -> Result<Option<Job>, TaskStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let result: Option<(String, String)> = conn
            .blpop(Self::queue_key(queue_name), timeout.as_secs_f64())
            .await?;
        match result {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn queue_key(queue_name: &str) -> String {
        format!("pifs:queue:{queue_name}")
    }

    fn processing_key(task_id: &TaskId) -> String {
        format!("pifs:processing:{task_id}")
    }

    /// Records that a worker has claimed `task_id` and is actively
    /// running it, so that [`TaskStore::get_reconciled`] can tell a job
    /// that's genuinely still in flight from one whose worker died
    /// before it could call [`TaskStore::mark_done`] or
    /// [`TaskStore::mark_error`]. Expires on its own after `JOB_TIMEOUT`
    /// in case a worker is killed hard enough to skip
    /// [`TaskStore::clear_processing`] too.
    pub async fn mark_processing(&self, task_id: &TaskId) -> Result<(), TaskStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(
                Self::processing_key(task_id),
                proxmox_time::epoch_i64(),
                JOB_TIMEOUT.as_secs(),
            )
            .await?;
        Ok(())
    }

    pub async fn clear_processing(&self, task_id: &TaskId) -> Result<(), TaskStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::processing_key(task_id)).await?;
        Ok(())
    }

    async fn processing_started_at(&self, task_id: &TaskId) -> Result<Option<i64>, TaskStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let started: Option<i64> = conn.get(Self::processing_key(task_id)).await?;
        Ok(started)
    }

    pub async fn mark_done(&self, task_id: &TaskId) -> Result<(), TaskStoreError> {
        sqlx::query("UPDATE tasks SET status = $1, message = $2 WHERE id = $3")
            .bind(TaskStatus::Done)
            .bind("done")
            .bind(task_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_error(
        &self,
        task_id: &TaskId,
        message: &str,
        errors: Vec<TaskError>,
    ) -> Result<(), TaskStoreError> {
        sqlx::query("UPDATE tasks SET status = $1, message = $2, errors = $3 WHERE id = $4")
            .bind(TaskStatus::Error)
            .bind(message)
            .bind(serde_json::to_value(&errors)?)
            .bind(task_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Reads a task, reconciling a `Pending` row whose worker is gone
    /// (spec §4.7 invariant, §5 ordering guarantee (b)). A row still has
    /// a live [`TaskStore::mark_processing`] claim iff some worker is
    /// actually running it right now; that claim, not the row's age, is
    /// what tells a crashed job apart from a genuinely long-running one.
    pub async fn get_reconciled(&self, task_id: &TaskId) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT id, project_id, status, message, errors, created_at FROM tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = row.into_task()?;

        if task.status == TaskStatus::Pending {
            let now = proxmox_time::epoch_i64();
            let failed = match self.processing_started_at(&task.id).await? {
                // A worker is holding the claim: it's still working the
                // job unless it's been at it implausibly long.
                Some(claimed_at) => now - claimed_at > JOB_TIMEOUT.as_secs() as i64,
                // No worker claims it. Either it was never picked up, or
                // it crashed after dequeueing without updating the row;
                // either way the row's own age is all that's left to go
                // on.
                None => now - task.created_at > JOB_TIMEOUT.as_secs() as i64,
            };
            if failed {
                self.mark_error(&task.id, "Internal server error", Vec::new())
                    .await?;
                self.clear_processing(&task.id).await?;
                task.status = TaskStatus::Error;
                task.message = "Internal server error".to_string();
            }
        }

        Ok(Some(task))
    }

    pub async fn delete(&self, task_id: &TaskId) -> Result<(), TaskStoreError> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: TaskId,
    project_id: String,
    status: TaskStatus,
    message: String,
    errors: serde_json::Value,
    created_at: i64,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, serde_json::Error> {
        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            status: self.status,
            message: self.message,
            errors: serde_json::from_value(self.errors)?,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_timeout_is_twelve_hours() {
        assert_eq!(JOB_TIMEOUT, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn failed_ttl_is_seven_days() {
        assert_eq!(JOB_FAILED_TTL, Duration::from_secs(7 * 24 * 3600));
    }
}
