pub mod handler;

pub use handler::{JobForm, JobInfo, RequestHandler, SubscriptionKind};

/// Default history limit for `info_job` (spec §4.5 `info_job(name, limit=20)`).
pub const DEFAULT_INFO_JOB_LIMIT: i64 = 20;
