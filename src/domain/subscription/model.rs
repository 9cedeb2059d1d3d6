//! Alert subscription entities (§3 JobAlert, TagAlert): who gets emailed
//! when a job fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Subscribes `email` to failure alerts for a single job.
///
/// `(job_name, email)` is unique — a recipient cannot double-subscribe.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct JobAlert {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_name: String,
    pub email: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Subscribes `email` to failure alerts for every job carrying `tag_name`.
///
/// `(tag_name, email)` is unique.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct TagAlert {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub tag_name: String,
    pub email: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}
