//! User entity (§3 User): an operator account that can subscribe to alerts
//! and act through the Request Handler.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct User {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub email: String,
    pub password_hash: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Hash `password` with Argon2 and build a new, unpersisted `User`.
    pub fn register(email: impl Into<String>, password: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SchedulerError::Internal(format!("could not hash password: {e}")))?
            .to_string();

        Ok(User::builder().email(email).password_hash(password_hash).build())
    }

    pub fn verify_password(&self, password: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&self.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_user_verifies_correct_password() {
        let user = User::register("ops@example.com", "hunter2").unwrap();
        assert!(user.verify_password("hunter2"));
    }

    #[test]
    fn registered_user_rejects_wrong_password() {
        let user = User::register("ops@example.com", "hunter2").unwrap();
        assert!(!user.verify_password("wrong"));
    }

    #[test]
    fn password_hash_is_never_the_plaintext() {
        let user = User::register("ops@example.com", "hunter2").unwrap();
        assert_ne!(user.password_hash, "hunter2");
    }
}
