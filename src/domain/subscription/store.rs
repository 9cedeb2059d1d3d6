//! State Store operations for JobAlert/TagAlert (spec §4.2, §4.6 Alert Fanout).

use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;

use super::model::{JobAlert, TagAlert};
use crate::error::{Result, SchedulerError};

pub struct SubscriptionStore;

impl SubscriptionStore {
    /// Transactional twin of `subscribe_job`, used by `RequestHandler::add_job`/`edit_job`.
    pub async fn subscribe_job_tx(
        tx: &mut Transaction<'_, Postgres>,
        job_name: &str,
        email: &str,
    ) -> Result<JobAlert> {
        let existing = sqlx::query_as::<_, JobAlert>(
            "SELECT id, job_name, email, created_at FROM job_alerts WHERE job_name = $1 AND email = $2",
        )
        .bind(job_name)
        .bind(email)
        .fetch_optional(&mut **tx)
        .await?;

        if existing.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "'{email}' is already subscribed to job '{job_name}'"
            )));
        }

        let alert = JobAlert::builder().job_name(job_name).email(email).build();

        let inserted = sqlx::query_as::<_, JobAlert>(
            r#"
            INSERT INTO job_alerts (id, job_name, email, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_name, email, created_at
            "#,
        )
        .bind(alert.id)
        .bind(&alert.job_name)
        .bind(&alert.email)
        .bind(alert.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }

    /// Transactional twin of `unsubscribe_job`.
    pub async fn unsubscribe_job_tx(
        tx: &mut Transaction<'_, Postgres>,
        job_name: &str,
        email: &str,
    ) -> Result<()> {
        let result = sqlx::query("DELETE FROM job_alerts WHERE job_name = $1 AND email = $2")
            .bind(job_name)
            .bind(email)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!(
                "'{email}' is not subscribed to job '{job_name}'"
            )));
        }

        Ok(())
    }

    /// Direct (non-tag-derived) subscribers of a job, read within a
    /// transaction — the correct base set for `edit_job`'s subscriber diff,
    /// as opposed to `list_recipients`'s job ∪ tag union (spec §4.2 vs §4.6).
    pub async fn list_job_alert_emails_tx(
        tx: &mut Transaction<'_, Postgres>,
        job_name: &str,
    ) -> Result<Vec<String>> {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT email FROM job_alerts WHERE job_name = $1",
        )
        .bind(job_name)
        .fetch_all(&mut **tx)
        .await?;

        Ok(emails)
    }

    pub async fn subscribe_job(pool: &PgPool, job_name: &str, email: &str) -> Result<JobAlert> {
        let existing = sqlx::query_as::<_, JobAlert>(
            "SELECT id, job_name, email, created_at FROM job_alerts WHERE job_name = $1 AND email = $2",
        )
        .bind(job_name)
        .bind(email)
        .fetch_optional(pool)
        .await?;

        if existing.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "'{email}' is already subscribed to job '{job_name}'"
            )));
        }

        let alert = JobAlert::builder().job_name(job_name).email(email).build();

        let inserted = sqlx::query_as::<_, JobAlert>(
            r#"
            INSERT INTO job_alerts (id, job_name, email, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_name, email, created_at
            "#,
        )
        .bind(alert.id)
        .bind(&alert.job_name)
        .bind(&alert.email)
        .bind(alert.created_at)
        .fetch_one(pool)
        .await?;

        Ok(inserted)
    }

    pub async fn unsubscribe_job(pool: &PgPool, job_name: &str, email: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM job_alerts WHERE job_name = $1 AND email = $2")
            .bind(job_name)
            .bind(email)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!(
                "'{email}' is not subscribed to job '{job_name}'"
            )));
        }

        Ok(())
    }

    pub async fn subscribe_tag(pool: &PgPool, tag_name: &str, email: &str) -> Result<TagAlert> {
        let existing = sqlx::query_as::<_, TagAlert>(
            "SELECT id, tag_name, email, created_at FROM tag_alerts WHERE tag_name = $1 AND email = $2",
        )
        .bind(tag_name)
        .bind(email)
        .fetch_optional(pool)
        .await?;

        if existing.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "'{email}' is already subscribed to tag '{tag_name}'"
            )));
        }

        let alert = TagAlert::builder().tag_name(tag_name).email(email).build();

        let inserted = sqlx::query_as::<_, TagAlert>(
            r#"
            INSERT INTO tag_alerts (id, tag_name, email, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tag_name, email, created_at
            "#,
        )
        .bind(alert.id)
        .bind(&alert.tag_name)
        .bind(&alert.email)
        .bind(alert.created_at)
        .fetch_one(pool)
        .await?;

        Ok(inserted)
    }

    pub async fn unsubscribe_tag(pool: &PgPool, tag_name: &str, email: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tag_alerts WHERE tag_name = $1 AND email = $2")
            .bind(tag_name)
            .bind(email)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!(
                "'{email}' is not subscribed to tag '{tag_name}'"
            )));
        }

        Ok(())
    }

    /// The deduplicated recipient set for a job's failure alert: direct
    /// `job_alerts` subscribers unioned with `tag_alerts` subscribers for
    /// every tag the job carries (spec §4.6).
    pub async fn list_recipients(pool: &PgPool, job_name: &str) -> Result<Vec<String>> {
        let direct = sqlx::query_scalar::<_, String>(
            "SELECT email FROM job_alerts WHERE job_name = $1",
        )
        .bind(job_name)
        .fetch_all(pool)
        .await?;

        let via_tags = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT ta.email
            FROM tag_alerts ta
            JOIN tags t ON t.name = ta.tag_name
            WHERE t.job_name = $1
            "#,
        )
        .bind(job_name)
        .fetch_all(pool)
        .await?;

        let recipients: BTreeSet<String> = direct.into_iter().chain(via_tags).collect();
        Ok(recipients.into_iter().collect())
    }
}
