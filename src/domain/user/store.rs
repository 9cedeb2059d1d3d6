//! State Store operations for User (spec §4.2).

use sqlx::PgPool;

use super::model::User;
use crate::error::{Result, SchedulerError};

pub struct UserStore;

impl UserStore {
    pub async fn create(pool: &PgPool, user: &User) -> Result<User> {
        if Self::get_by_email(pool, &user.email).await?.is_some() {
            return Err(SchedulerError::Duplicate(format!(
                "user '{}' already registered",
                user.email
            )));
        }

        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(pool)
        .await?;

        Ok(inserted)
    }

    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
