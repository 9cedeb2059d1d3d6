//! Job entity: a recurring unit of work (§3 Job).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// What kind of command a job's `command` string is dispatched as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "operator", rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Bash,
    Sql,
    /// Declared but never implemented (spec §9 Open Questions) — dispatch
    /// fails with `SchedulerError::Broker("unsupported operator: python")`.
    Python,
}

/// Health classification of a Job, derived from its most recent terminal task.
///
/// `as_i16` preserves the ordinal convention named in spec §3/§6
/// (fail=0, success=1, unknown=2) for callers that need the legacy numeric
/// encoding; the Postgres column itself is a native enum, matching the
/// teacher's convention for small closed sets (`JobStatus`/`JobPriority` in
/// `kernel/jobs/job.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_health", rename_all = "snake_case")]
pub enum JobHealth {
    Fail,
    Success,
    #[default]
    Unknown,
}

impl JobHealth {
    pub fn as_i16(&self) -> i16 {
        match self {
            JobHealth::Fail => 0,
            JobHealth::Success => 1,
            JobHealth::Unknown => 2,
        }
    }
}

/// A recurring unit of work (§3 Job).
///
/// Timestamps suffixed `_local` are naive wall-clock values in `timezone`,
/// never compared directly against `DateTime<Utc>` fields — the only
/// conversion point is the scheduler's due-check (see `scheduler::dispatch`).
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub name: String,
    pub timezone: String,
    pub operator: Operator,

    #[builder(default, setter(strip_option))]
    pub database: Option<String>,

    pub command: String,

    pub start_dt: NaiveDateTime,
    #[builder(default, setter(strip_option))]
    pub end_dt: Option<NaiveDateTime>,

    pub schedule_interval: String,
    pub next_run_local_ts: NaiveDateTime,

    pub reset_status_at: NaiveDateTime,

    #[builder(default = true)]
    pub active: bool,
    #[builder(default, setter(strip_option))]
    pub block_till: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub block_by: Option<String>,
    #[builder(default, setter(strip_option))]
    pub block_msg: Option<String>,

    #[builder(default)]
    pub status: JobHealth,
    #[builder(default, setter(strip_option))]
    pub last_execution_ts: Option<NaiveDateTime>,
    #[builder(default, setter(strip_option))]
    pub last_task_result: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// §3 invariant: `end_dt = null ∨ end_dt > start_dt`.
    pub fn end_after_start(&self) -> bool {
        self.end_dt.is_none_or(|end| end > self.start_dt)
    }

    /// §4.4.1 step 2: the job's active window has closed.
    pub fn window_closed(&self, now_local: NaiveDateTime) -> bool {
        self.end_dt.is_some_and(|end| now_local >= end)
    }

    /// §3/§4.4.1 step 1: currently within an admin-imposed block.
    pub fn is_blocked(&self, now_utc: DateTime<Utc>) -> bool {
        self.block_till.is_some_and(|till| now_utc < till)
    }

    /// Truncate a task result to the 1000-char cap shared by
    /// `last_task_result` and `TaskInstance::result`.
    pub fn truncate_result(result: &str) -> String {
        const CAP: usize = 1000;
        if result.len() <= CAP {
            result.to_string()
        } else {
            result.chars().take(CAP).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Job {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        Job::builder()
            .name("J1")
            .timezone("US/Eastern")
            .operator(Operator::Bash)
            .command("echo 1")
            .start_dt(start)
            .schedule_interval("30 9 * * *")
            .next_run_local_ts(start)
            .reset_status_at(start)
            .build()
    }

    #[test]
    fn new_job_defaults_active() {
        assert!(sample().active);
    }

    #[test]
    fn new_job_defaults_unknown_status() {
        assert_eq!(sample().status, JobHealth::Unknown);
    }

    #[test]
    fn no_end_dt_satisfies_invariant() {
        assert!(sample().end_after_start());
    }

    #[test]
    fn end_dt_before_start_violates_invariant() {
        let mut job = sample();
        job.end_dt = Some(job.start_dt - chrono::Duration::days(1));
        assert!(!job.end_after_start());
    }

    #[test]
    fn block_till_in_future_blocks() {
        let mut job = sample();
        job.block_till = Some(Utc::now() + chrono::Duration::days(1));
        assert!(job.is_blocked(Utc::now()));
    }

    #[test]
    fn block_till_in_past_does_not_block() {
        let mut job = sample();
        job.block_till = Some(Utc::now() - chrono::Duration::days(1));
        assert!(!job.is_blocked(Utc::now()));
    }

    #[test]
    fn truncate_result_caps_at_1000_chars() {
        let long = "x".repeat(2000);
        assert_eq!(Job::truncate_result(&long).len(), 1000);
    }

    #[test]
    fn job_health_ordinal_matches_spec_convention() {
        assert_eq!(JobHealth::Fail.as_i16(), 0);
        assert_eq!(JobHealth::Success.as_i16(), 1);
        assert_eq!(JobHealth::Unknown.as_i16(), 2);
    }
}
