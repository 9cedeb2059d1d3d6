//! Tag entity: a label attached to a job, used to group jobs for alert
//! subscriptions (§3 Tag).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// A `(name, job_name)` pair is unique — a job cannot carry the same tag twice.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Tag {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub name: String,
    pub job_name: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}
