//! State Store operations for Tag (spec §4.2).

use sqlx::{PgPool, Postgres, Transaction};

use super::model::Tag;
use crate::error::{Result, SchedulerError};

pub struct TagStore;

impl TagStore {
    /// Transactional twin of `attach`, used by `RequestHandler::add_job`/`edit_job`
    /// so tag reconciliation commits atomically with the owning job edit.
    pub async fn attach_tx(tx: &mut Transaction<'_, Postgres>, name: &str, job_name: &str) -> Result<Tag> {
        let existing = sqlx::query_as::<_, Tag>(
            "SELECT id, name, job_name, created_at FROM tags WHERE name = $1 AND job_name = $2",
        )
        .bind(name)
        .bind(job_name)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(tag) = existing {
            return Err(SchedulerError::Duplicate(format!(
                "job '{job_name}' already carries tag '{name}' (id {})",
                tag.id
            )));
        }

        let tag = Tag::builder().name(name).job_name(job_name).build();

        let inserted = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (id, name, job_name, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, job_name, created_at
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(&tag.job_name)
        .bind(tag.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }

    /// Transactional twin of `detach`.
    pub async fn detach_tx(tx: &mut Transaction<'_, Postgres>, name: &str, job_name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tags WHERE name = $1 AND job_name = $2")
            .bind(name)
            .bind(job_name)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!(
                "job '{job_name}' does not carry tag '{name}'"
            )));
        }

        Ok(())
    }

    /// Transactional twin of `list_for_job`.
    pub async fn list_for_job_tx(tx: &mut Transaction<'_, Postgres>, job_name: &str) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, job_name, created_at FROM tags WHERE job_name = $1 ORDER BY name",
        )
        .bind(job_name)
        .fetch_all(&mut **tx)
        .await?;

        Ok(tags)
    }

    pub async fn attach(pool: &PgPool, name: &str, job_name: &str) -> Result<Tag> {
        let existing = sqlx::query_as::<_, Tag>(
            "SELECT id, name, job_name, created_at FROM tags WHERE name = $1 AND job_name = $2",
        )
        .bind(name)
        .bind(job_name)
        .fetch_optional(pool)
        .await?;

        if let Some(tag) = existing {
            return Err(SchedulerError::Duplicate(format!(
                "job '{job_name}' already carries tag '{name}' (id {})",
                tag.id
            )));
        }

        let tag = Tag::builder().name(name).job_name(job_name).build();

        let inserted = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (id, name, job_name, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, job_name, created_at
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(&tag.job_name)
        .bind(tag.created_at)
        .fetch_one(pool)
        .await?;

        Ok(inserted)
    }

    pub async fn detach(pool: &PgPool, name: &str, job_name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tags WHERE name = $1 AND job_name = $2")
            .bind(name)
            .bind(job_name)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::NotFound(format!(
                "job '{job_name}' does not carry tag '{name}'"
            )));
        }

        Ok(())
    }

    pub async fn list_for_job(pool: &PgPool, job_name: &str) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, job_name, created_at FROM tags WHERE job_name = $1 ORDER BY name",
        )
        .bind(job_name)
        .fetch_all(pool)
        .await?;

        Ok(tags)
    }

    /// Every distinct job name carrying the given tag.
    pub async fn job_names_for_tag(pool: &PgPool, name: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT job_name FROM tags WHERE name = $1 ORDER BY job_name",
        )
        .bind(name)
        .fetch_all(pool)
        .await?;

        Ok(names)
    }
}
