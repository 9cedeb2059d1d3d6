//! State Store operations for TaskInstance (spec §4.2).

use sqlx::PgPool;
use uuid::Uuid;

use super::model::TaskInstance;
use crate::error::{Result, SchedulerError};

const TASK_COLUMNS: &str =
    "id, job_name, execution_date, task_handle, state, result, created_at, updated_at";

pub struct TaskStore;

impl TaskStore {
    pub async fn create(pool: &PgPool, task: &TaskInstance) -> Result<TaskInstance> {
        let inserted = sqlx::query_as::<_, TaskInstance>(&format!(
            r#"
            INSERT INTO task_instances ({TASK_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(&task.job_name)
        .bind(task.execution_date)
        .bind(&task.task_handle)
        .bind(task.state)
        .bind(&task.result)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(inserted)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<TaskInstance>> {
        let task = sqlx::query_as::<_, TaskInstance>(&format!(
            "SELECT {TASK_COLUMNS} FROM task_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    pub async fn update(pool: &PgPool, task: &TaskInstance) -> Result<TaskInstance> {
        let updated = sqlx::query_as::<_, TaskInstance>(&format!(
            r#"
            UPDATE task_instances SET
                task_handle = $2, state = $3, result = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(&task.task_handle)
        .bind(task.state)
        .bind(&task.result)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| SchedulerError::NotFound(format!("task '{}' not found", task.id)))?;

        Ok(updated)
    }

    /// Tasks still awaiting a terminal state, polled each reconcile pass
    /// (spec §4.4.2). Selects with a write lock (spec §4.2
    /// `list_open_tasks()`), `SKIP LOCKED` so a concurrent
    /// `clear_tasks_history` on the same job can't deadlock against this scan.
    pub async fn list_open(pool: &PgPool) -> Result<Vec<TaskInstance>> {
        let tasks = sqlx::query_as::<_, TaskInstance>(&format!(
            r#"
            WITH open_tasks AS (
                SELECT id FROM task_instances
                WHERE state NOT IN ('SUCCESS', 'FAILURE', 'REVOKED')
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
            )
            SELECT {TASK_COLUMNS} FROM task_instances
            WHERE id IN (SELECT id FROM open_tasks)
            ORDER BY created_at
            "#
        ))
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// History listing ordered `job_name ASC, execution_date DESC` (spec §4.5
    /// `info_job`).
    pub async fn list_for_job(pool: &PgPool, job_name: &str, limit: i64) -> Result<Vec<TaskInstance>> {
        let tasks = sqlx::query_as::<_, TaskInstance>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM task_instances
            WHERE job_name = $1
            ORDER BY job_name ASC, execution_date DESC
            LIMIT $2
            "#
        ))
        .bind(job_name)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Deletes all history for a job. `force` bypasses the guard against
    /// clearing history for a job that still has open tasks (spec §6
    /// `clear_tasks_history`).
    pub async fn clear_for_job(pool: &PgPool, job_name: &str, force: bool) -> Result<u64> {
        if !force {
            let open = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM task_instances WHERE job_name = $1 AND state NOT IN ('SUCCESS', 'FAILURE', 'REVOKED')",
            )
            .bind(job_name)
            .fetch_one(pool)
            .await?;

            if open > 0 {
                return Err(SchedulerError::Conflict(format!(
                    "job '{job_name}' has {open} open task(s); pass force=true to clear anyway"
                )));
            }
        }

        let result = sqlx::query("DELETE FROM task_instances WHERE job_name = $1")
            .bind(job_name)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
