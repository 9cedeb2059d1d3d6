//! Alert Fanout (spec §4.6): compose and send the failure alert for a job,
//! to the deduplicated union of its direct subscribers and its tags'
//! subscribers.

use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::job::Job;
use crate::domain::subscription::SubscriptionStore;
use crate::kernel::mailer::MailSender;

const SUBJECT: &str = "Dashboard - Job Failure Alert";

pub struct AlertFanout;

impl AlertFanout {
    /// Recipients list is already stable-sorted by `SubscriptionStore::list_recipients`
    /// (it collects into a `BTreeSet`), satisfying the idempotent-testing
    /// requirement in spec §4.6.
    pub async fn notify_failure(pool: &PgPool, mailer: &dyn MailSender, job: &Job) {
        let recipients = match SubscriptionStore::list_recipients(pool, &job.name).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(job_name = %job.name, error = %e, "could not resolve alert recipients");
                return;
            }
        };

        if recipients.is_empty() {
            return;
        }

        let body = format!(
            "Job: {}\nCommand: {}\nLast result: {}",
            job.name,
            job.command,
            job.last_task_result.as_deref().unwrap_or("")
        );

        // Mail Sender failures are logged, never propagated: the reconcile
        // transaction that led here still commits (spec §4.6).
        match mailer.send_email(SUBJECT, &recipients, &body).await {
            Ok(()) => info!(job_name = %job.name, recipients = recipients.len(), "failure alert sent"),
            Err(e) => error!(job_name = %job.name, error = %e, "failure alert send failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_job() -> Job {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        Job::builder()
            .name("J1")
            .timezone("US/Eastern")
            .operator(crate::domain::job::Operator::Bash)
            .command("echo 1")
            .start_dt(start)
            .schedule_interval("30 9 * * *")
            .next_run_local_ts(start)
            .reset_status_at(start)
            .last_task_result("0 rows")
            .build()
    }

    #[test]
    fn body_includes_job_name_command_and_last_result() {
        let job = sample_job();
        let body = format!(
            "Job: {}\nCommand: {}\nLast result: {}",
            job.name,
            job.command,
            job.last_task_result.as_deref().unwrap_or("")
        );
        assert!(body.contains("J1"));
        assert!(body.contains("echo 1"));
        assert!(body.contains("0 rows"));
    }
}
