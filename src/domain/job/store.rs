//! State Store operations for Job (spec §4.2): the relational home for job
//! definitions, queried directly with hand-written `query_as` rather than
//! compile-time-checked macros so the crate builds without a live database.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::model::Job;
use crate::error::{Result, SchedulerError};

const JOB_COLUMNS: &str = "id, name, timezone, operator, database, command, start_dt, end_dt, \
     schedule_interval, next_run_local_ts, reset_status_at, active, block_till, block_by, \
     block_msg, status, last_execution_ts, last_task_result, created_at, updated_at";

/// CRUD and scheduling queries against the `jobs` table.
pub struct JobStore;

impl JobStore {
    pub async fn create(pool: &PgPool, job: &Job) -> Result<Job> {
        if Self::get_by_name(pool, &job.name).await?.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "job '{}' already exists",
                job.name
            )));
        }

        let query = format!(
            r#"
            INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, Job>(&query)
            .bind(job.id)
            .bind(&job.name)
            .bind(&job.timezone)
            .bind(job.operator)
            .bind(&job.database)
            .bind(&job.command)
            .bind(job.start_dt)
            .bind(job.end_dt)
            .bind(&job.schedule_interval)
            .bind(job.next_run_local_ts)
            .bind(job.reset_status_at)
            .bind(job.active)
            .bind(job.block_till)
            .bind(&job.block_by)
            .bind(&job.block_msg)
            .bind(job.status)
            .bind(job.last_execution_ts)
            .bind(&job.last_task_result)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(pool)
            .await?;

        Ok(inserted)
    }

    /// Transactional twin of `create`, used by `RequestHandler::add_job`
    /// (spec §4.5 "insert Job + Tags + JobAlerts" as one unit) so a failed
    /// tag/subscriber insert rolls the whole job creation back.
    pub async fn create_tx(tx: &mut Transaction<'_, Postgres>, job: &Job) -> Result<Job> {
        let existing = sqlx::query_as::<_, Job>("SELECT id, name, timezone, operator, database, \
             command, start_dt, end_dt, schedule_interval, next_run_local_ts, reset_status_at, \
             active, block_till, block_by, block_msg, status, last_execution_ts, \
             last_task_result, created_at, updated_at FROM jobs WHERE name = $1")
            .bind(&job.name)
            .fetch_optional(&mut **tx)
            .await?;

        if existing.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "job '{}' already exists",
                job.name
            )));
        }

        let query = format!(
            r#"
            INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, Job>(&query)
            .bind(job.id)
            .bind(&job.name)
            .bind(&job.timezone)
            .bind(job.operator)
            .bind(&job.database)
            .bind(&job.command)
            .bind(job.start_dt)
            .bind(job.end_dt)
            .bind(&job.schedule_interval)
            .bind(job.next_run_local_ts)
            .bind(job.reset_status_at)
            .bind(job.active)
            .bind(job.block_till)
            .bind(&job.block_by)
            .bind(&job.block_msg)
            .bind(job.status)
            .bind(job.last_execution_ts)
            .bind(&job.last_task_result)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&mut **tx)
            .await?;

        Ok(inserted)
    }

    /// Row-locking, transactional lookup used at the start of `edit_job`
    /// (spec §4.5) so the read-modify-write of a job's mutable fields can't
    /// race a concurrent editor within the same transaction.
    pub async fn require_by_name_for_update_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE name = $1 FOR UPDATE"
        ))
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| SchedulerError::NotFound(format!("job '{name}' not found")))?;

        Ok(job)
    }

    /// Transactional twin of `update`, used by `RequestHandler::edit_job`.
    pub async fn update_tx(tx: &mut Transaction<'_, Postgres>, job: &Job) -> Result<Job> {
        let updated = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs SET
                timezone = $2, operator = $3, database = $4, command = $5,
                start_dt = $6, end_dt = $7, schedule_interval = $8, next_run_local_ts = $9,
                reset_status_at = $10, active = $11, block_till = $12, block_by = $13,
                block_msg = $14, status = $15, last_execution_ts = $16, last_task_result = $17,
                updated_at = NOW()
            WHERE name = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.name)
        .bind(&job.timezone)
        .bind(job.operator)
        .bind(&job.database)
        .bind(&job.command)
        .bind(job.start_dt)
        .bind(job.end_dt)
        .bind(&job.schedule_interval)
        .bind(job.next_run_local_ts)
        .bind(job.reset_status_at)
        .bind(job.active)
        .bind(job.block_till)
        .bind(&job.block_by)
        .bind(&job.block_msg)
        .bind(job.status)
        .bind(job.last_execution_ts)
        .bind(&job.last_task_result)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| SchedulerError::NotFound(format!("job '{}' not found", job.name)))?;

        Ok(updated)
    }

    pub async fn get_by_name(pool: &PgPool, name: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(job)
    }

    pub async fn require_by_name(pool: &PgPool, name: &str) -> Result<Job> {
        Self::get_by_name(pool, name)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("job '{name}' not found")))
    }

    pub async fn list(pool: &PgPool, active_only: bool) -> Result<Vec<Job>> {
        let query = if active_only {
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE active = true ORDER BY name")
        } else {
            format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY name")
        };

        let jobs = sqlx::query_as::<_, Job>(&query).fetch_all(pool).await?;
        Ok(jobs)
    }

    pub async fn update(pool: &PgPool, job: &Job) -> Result<Job> {
        let updated = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs SET
                timezone = $2, operator = $3, database = $4, command = $5,
                start_dt = $6, end_dt = $7, schedule_interval = $8, next_run_local_ts = $9,
                reset_status_at = $10, active = $11, block_till = $12, block_by = $13,
                block_msg = $14, status = $15, last_execution_ts = $16, last_task_result = $17,
                updated_at = NOW()
            WHERE name = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.name)
        .bind(&job.timezone)
        .bind(job.operator)
        .bind(&job.database)
        .bind(&job.command)
        .bind(job.start_dt)
        .bind(job.end_dt)
        .bind(&job.schedule_interval)
        .bind(job.next_run_local_ts)
        .bind(job.reset_status_at)
        .bind(job.active)
        .bind(job.block_till)
        .bind(&job.block_by)
        .bind(&job.block_msg)
        .bind(job.status)
        .bind(job.last_execution_ts)
        .bind(&job.last_task_result)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| SchedulerError::NotFound(format!("job '{}' not found", job.name)))?;

        Ok(updated)
    }

    /// Deletes a job and cascades to its tasks, tags, and alert subscriptions
    /// (spec §4.2 "delete_job_cascade").
    pub async fn delete_cascade(pool: &PgPool, name: &str) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM task_instances WHERE job_name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM job_alerts WHERE job_name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tags WHERE job_name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM jobs WHERE name = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!("job '{name}' not found")));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Atomically claims this tick's candidate jobs, so that only one
    /// scheduler instance (holder of the Lease, see `kernel::lease`) ever
    /// acts on a given job this tick (spec §4.4.1 `claim_active_jobs_for_tick`).
    ///
    /// A candidate is any job still worth running the dispatch-pass steps
    /// against: active jobs (step 4 due-check decides whether they actually
    /// fire) and inactive-but-blocked jobs whose block may have expired
    /// (step 1 unblock). Jobs that are inactive for any other reason are not
    /// candidates.
    pub async fn claim_due(pool: &PgPool, _now_utc: DateTime<Utc>, limit: i64) -> Result<Vec<Job>> {
        let query = format!(
            r#"
            WITH candidates AS (
                SELECT id FROM jobs
                WHERE active = true OR block_till IS NOT NULL
                ORDER BY id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            SELECT {JOB_COLUMNS} FROM jobs WHERE id IN (SELECT id FROM candidates)
            "#
        );

        let jobs = sqlx::query_as::<_, Job>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        Ok(jobs)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(job)
    }
}
