//! TaskInstance entity: a single dispatched execution of a Job (§3 TaskInstance).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// The task-broker lifecycle state of a single dispatched execution.
///
/// Mirrors the Celery `AsyncResult` state machine named in spec §3: the
/// monotone progression is `Pending -> Started -> (Success | Failure |
/// Revoked)`, with `Retry` a transient excursion back toward `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "task_state", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl TaskState {
    /// Terminal states never transition further (spec §3 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure | TaskState::Revoked)
    }
}

/// A single dispatched execution of a Job (§3 TaskInstance).
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct TaskInstance {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_name: String,
    pub execution_date: NaiveDateTime,

    /// Broker-assigned handle (Celery `AsyncResult.id` in the original
    /// system); set exactly once at dispatch time and never overwritten.
    #[builder(default, setter(strip_option))]
    pub task_handle: Option<String>,

    #[builder(default)]
    pub state: TaskState,

    /// Truncated to 1000 chars, see `Job::truncate_result` (spec §3).
    #[builder(default, setter(strip_option))]
    pub result: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl TaskInstance {
    /// §3 invariant: state only ever moves forward, never out of a terminal state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.task_handle.is_none() && !matches!(next, TaskState::Pending) {
            // A handle must be recorded before any non-pending transition.
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> TaskInstance {
        let exec = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        TaskInstance::builder()
            .job_name("J1")
            .execution_date(exec)
            .build()
    }

    #[test]
    fn new_task_defaults_pending() {
        assert_eq!(sample().state, TaskState::Pending);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut task = sample();
        task.state = TaskState::Success;
        assert!(!task.can_transition_to(TaskState::Failure));
    }

    #[test]
    fn non_pending_transition_requires_a_handle_first() {
        let task = sample();
        assert!(!task.can_transition_to(TaskState::Started));
    }

    #[test]
    fn handle_present_allows_progression() {
        let mut task = sample();
        task.task_handle = Some("celery-handle-1".into());
        assert!(task.can_transition_to(TaskState::Started));
    }

}
