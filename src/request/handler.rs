//! Request Handler (spec §4.5): the in-process API consumed by the HTTP and
//! CLI collaborators (both out of scope here, see spec §1). Every operation
//! here is transactional end-to-end.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::job::{CronEvaluator, Job, JobStore, Operator};
use crate::domain::subscription::SubscriptionStore;
use crate::domain::tag::TagStore;
use crate::domain::task::{TaskInstance, TaskStore};
use crate::domain::user::{User, UserStore};
use crate::error::{Result, SchedulerError};
use crate::kernel::SchedulerContext;
use crate::scheduler::dispatch::materialize_and_dispatch;

/// Inputs for `add_job`/`edit_job`: the schedule surface named in spec §6
/// (preset, raw crontab, or explicit weekday list — `schedule_interval_crontab`
/// overrides preset selection when non-empty).
#[derive(Debug, Clone)]
pub struct JobForm {
    pub name: String,
    pub timezone: String,
    pub operator: Operator,
    pub database: Option<String>,
    pub command: String,
    pub start_dt: NaiveDateTime,
    pub end_dt: Option<NaiveDateTime>,
    pub reset_status_at: NaiveDateTime,
    /// `@hourly|@daily|@weekly|@weekdaydaily`, ignored when `schedule_interval_crontab` is set.
    pub schedule_preset: Option<String>,
    /// Overrides `schedule_preset` when non-empty (spec §6).
    pub schedule_interval_crontab: Option<String>,
    pub weekday_to_run: Option<Vec<i64>>,
}

pub struct RequestHandler;

impl RequestHandler {
    /// Validates `email` is RFC 5322-addressable using the same parser
    /// `SmtpMailSender` builds envelopes with (`lettre::Address`), so a
    /// subscriber that passes validation here is guaranteed deliverable by
    /// the Mail Sender later (spec §4.5 "email RFC-valid").
    fn validate_email(email: &str) -> Result<()> {
        email
            .parse::<lettre::Address>()
            .map(|_| ())
            .map_err(|e| SchedulerError::InvalidEmail(format!("{email}: {e}")))
    }

    pub async fn register(pool: &sqlx::PgPool, email: &str, password: &str) -> Result<User> {
        Self::validate_email(email)?;
        let user = User::register(email, password)?;
        UserStore::create(pool, &user).await
    }

    /// §3 invariant: `database` is required when `operator = sql`.
    fn validate_operator_database(form: &JobForm) -> Result<()> {
        if form.operator == Operator::Sql && form.database.as_deref().unwrap_or("").is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "database is required when operator is sql".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_schedule(form: &JobForm) -> Result<String> {
        if let Some(crontab) = form.schedule_interval_crontab.as_deref().filter(|s| !s.is_empty()) {
            if !CronEvaluator::valid_crontab_string(crontab) {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "invalid crontab string: {crontab}"
                )));
            }
            return Ok(crontab.to_string());
        }

        if let Some(weekdays) = &form.weekday_to_run {
            return CronEvaluator::expand_weekday_list(form.start_dt, weekdays);
        }

        let preset = form
            .schedule_preset
            .as_deref()
            .ok_or_else(|| SchedulerError::InvalidSchedule("no schedule provided".to_string()))?;
        CronEvaluator::expand_preset(preset, form.start_dt)
    }

    /// Returns `Ok(false)` on a duplicate job name (spec §4.5 "returns false
    /// on duplicate name"), rather than an error, to match the documented
    /// contract for this one operation.
    ///
    /// The job row plus its tags and subscriber rows commit as one
    /// transaction (spec §4.5 "Every operation is transactional end-to-end"):
    /// a failed tag/subscriber insert rolls the whole add back rather than
    /// leaving an orphaned job row, matching the teacher's inline
    /// `pool.begin()` / `tx.commit()` pattern (e.g. `Member::increment_notification_count`).
    pub async fn add_job(
        ctx: &SchedulerContext,
        form: JobForm,
        tags: &[String],
        subscribers: &[String],
    ) -> Result<bool> {
        if JobStore::get_by_name(&ctx.db_pool, &form.name).await?.is_some() {
            return Ok(false);
        }

        Self::validate_operator_database(&form)?;
        let schedule_interval = Self::resolve_schedule(&form)?;

        let job = Job::builder()
            .name(form.name.clone())
            .timezone(form.timezone.clone())
            .operator(form.operator)
            .database(form.database.clone())
            .command(form.command.clone())
            .start_dt(form.start_dt)
            .end_dt(form.end_dt)
            .schedule_interval(schedule_interval)
            .next_run_local_ts(form.start_dt)
            .reset_status_at(form.reset_status_at)
            .build();

        if !job.end_after_start() {
            return Err(SchedulerError::InvalidSchedule(
                "end_dt must be null or after start_dt".to_string(),
            ));
        }

        let mut tx = ctx.db_pool.begin().await?;

        let result: Result<Job> = async {
            let job = JobStore::create_tx(&mut tx, &job).await?;
            for tag in tags {
                TagStore::attach_tx(&mut tx, tag, &job.name).await?;
            }
            for email in subscribers {
                SubscriptionStore::subscribe_job_tx(&mut tx, &job.name, email).await?;
            }
            Ok(job)
        }
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(true)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Replaces mutable fields and reconciles tags/subscribers to exactly
    /// the given sets (spec §4.5 "compute set-difference...delete/insert").
    ///
    /// Reads the job row `FOR UPDATE` and commits every mutation (job
    /// fields, tag diff, subscriber diff) in one transaction, so a
    /// concurrent editor can't interleave with this edit and a failure
    /// partway through leaves the job exactly as it was (spec §4.5, §7
    /// "Request Handler paths are transactional").
    pub async fn edit_job(
        ctx: &SchedulerContext,
        name: &str,
        form: JobForm,
        tags: &[String],
        subscribers: &[String],
    ) -> Result<Job> {
        Self::validate_operator_database(&form)?;
        let schedule_interval = Self::resolve_schedule(&form)?;
        let desired_tags: std::collections::HashSet<String> = tags.iter().cloned().collect();
        let desired_subs: std::collections::HashSet<String> = subscribers.iter().cloned().collect();

        let mut tx = ctx.db_pool.begin().await?;

        let result: Result<Job> = async {
            let mut job = JobStore::require_by_name_for_update_tx(&mut tx, name).await?;

            job.timezone = form.timezone;
            job.operator = form.operator;
            job.database = form.database;
            job.command = form.command;
            job.start_dt = form.start_dt;
            job.end_dt = form.end_dt;
            job.schedule_interval = schedule_interval;
            job.reset_status_at = form.reset_status_at;

            if !job.end_after_start() {
                return Err(SchedulerError::InvalidSchedule(
                    "end_dt must be null or after start_dt".to_string(),
                ));
            }

            let job = JobStore::update_tx(&mut tx, &job).await?;

            let current_tags: std::collections::HashSet<String> =
                TagStore::list_for_job_tx(&mut tx, &job.name)
                    .await?
                    .into_iter()
                    .map(|t| t.name)
                    .collect();

            for removed in current_tags.difference(&desired_tags) {
                TagStore::detach_tx(&mut tx, removed, &job.name).await?;
            }
            for added in desired_tags.difference(&current_tags) {
                TagStore::attach_tx(&mut tx, added, &job.name).await?;
            }

            // Diffed against direct job_alerts rows only, not the
            // tag-derived union `list_recipients` exposes to Alert Fanout.
            let current_subs: std::collections::HashSet<String> =
                SubscriptionStore::list_job_alert_emails_tx(&mut tx, &job.name)
                    .await?
                    .into_iter()
                    .collect();

            for removed in current_subs.difference(&desired_subs) {
                SubscriptionStore::unsubscribe_job_tx(&mut tx, &job.name, removed).await?;
            }
            for added in desired_subs.difference(&current_subs) {
                SubscriptionStore::subscribe_job_tx(&mut tx, &job.name, added).await?;
            }

            Ok(job)
        }
        .await;

        match result {
            Ok(job) => {
                tx.commit().await?;
                Ok(job)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    pub async fn remove_job(ctx: &SchedulerContext, name: &str) -> Result<()> {
        JobStore::delete_cascade(&ctx.db_pool, name).await
    }

    /// Toggles `active`. Spec: "no-op returns a reason message" when the
    /// requested state already holds.
    pub async fn change_job_status(
        ctx: &SchedulerContext,
        name: &str,
        deactivate: bool,
    ) -> Result<Option<String>> {
        let mut job = JobStore::require_by_name(&ctx.db_pool, name).await?;

        if job.active == !deactivate {
            return Ok(Some(format!(
                "job '{name}' is already {}",
                if deactivate { "inactive" } else { "active" }
            )));
        }

        job.active = !deactivate;
        JobStore::update(&ctx.db_pool, &job).await?;
        Ok(None)
    }

    pub async fn block_job_till(
        ctx: &SchedulerContext,
        name: &str,
        till: DateTime<Utc>,
        msg: &str,
        blocked_by_email: &str,
        errors: &mut Vec<String>,
    ) {
        if let Err(e) = Self::validate_email(blocked_by_email) {
            errors.push(e.to_string());
            return;
        }

        let mut job = match JobStore::require_by_name(&ctx.db_pool, name).await {
            Ok(job) => job,
            Err(e) => {
                errors.push(e.to_string());
                return;
            }
        };

        job.active = false;
        job.block_till = Some(till);
        job.block_by = Some(blocked_by_email.to_string());
        job.block_msg = Some(msg.to_string());

        if let Err(e) = JobStore::update(&ctx.db_pool, &job).await {
            errors.push(e.to_string());
        }
    }

    /// Materializes an ad-hoc execution (spec §4.4.1 "Forced run"):
    /// `execution_date = now_local`, `next_run_local_ts` unchanged. Returns
    /// `Ok(None)` if the job does not exist (spec §4.5 "returns null if not found").
    pub async fn force_schedule_for_job(ctx: &SchedulerContext, name: &str) -> Result<Option<TaskInstance>> {
        let Some(job) = JobStore::get_by_name(&ctx.db_pool, name).await? else {
            return Ok(None);
        };

        use chrono::TimeZone;
        let tz: chrono_tz::Tz = job
            .timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidSchedule(format!("unknown timezone: {}", job.timezone)))?;
        let now_local = Utc::now().with_timezone(&tz).naive_local();

        let task = materialize_and_dispatch(ctx, &job, now_local).await?;
        Ok(Some(task))
    }

    pub async fn subscribe(ctx: &SchedulerContext, kind: SubscriptionKind, target: &str, email: &str) -> Result<()> {
        match kind {
            SubscriptionKind::Job => {
                SubscriptionStore::subscribe_job(&ctx.db_pool, target, email).await?;
            }
            SubscriptionKind::Tag => {
                SubscriptionStore::subscribe_tag(&ctx.db_pool, target, email).await?;
            }
        }
        Ok(())
    }

    pub async fn unsubscribe(ctx: &SchedulerContext, kind: SubscriptionKind, target: &str, email: &str) -> Result<()> {
        match kind {
            SubscriptionKind::Job => SubscriptionStore::unsubscribe_job(&ctx.db_pool, target, email).await,
            SubscriptionKind::Tag => SubscriptionStore::unsubscribe_tag(&ctx.db_pool, target, email).await,
        }
    }

    /// `force=true` bypasses the open-tasks guard (spec's "Supplemented
    /// features": the original's `clear_db(force)` flag, extended here to
    /// the per-job history clear).
    pub async fn clear_tasks_history(ctx: &SchedulerContext, name: &str, force: bool) -> Result<u64> {
        TaskStore::clear_for_job(&ctx.db_pool, name, force).await
    }

    pub async fn info_job(
        ctx: &SchedulerContext,
        name: &str,
        limit: i64,
    ) -> Result<JobInfo> {
        let job = JobStore::require_by_name(&ctx.db_pool, name).await?;
        let tags = TagStore::list_for_job(&ctx.db_pool, name).await?;
        let tasks = TaskStore::list_for_job(&ctx.db_pool, name, limit).await?;
        let recipients = SubscriptionStore::list_recipients(&ctx.db_pool, name).await?;

        Ok(JobInfo {
            job,
            tags: tags.into_iter().map(|t| t.name).collect(),
            tasks,
            alert_recipients: recipients,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Job,
    Tag,
}

#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job: Job,
    pub tags: Vec<String>,
    pub tasks: Vec<TaskInstance>,
    pub alert_recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn form(operator: Operator, database: Option<&str>) -> JobForm {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        JobForm {
            name: "J1".to_string(),
            timezone: "US/Eastern".to_string(),
            operator,
            database: database.map(str::to_string),
            command: "select 1".to_string(),
            start_dt: start,
            end_dt: None,
            reset_status_at: start,
            schedule_preset: Some("@daily".to_string()),
            schedule_interval_crontab: None,
            weekday_to_run: None,
        }
    }

    #[test]
    fn sql_operator_without_database_is_rejected() {
        let result = RequestHandler::validate_operator_database(&form(Operator::Sql, None));
        assert!(result.is_err());
    }

    #[test]
    fn sql_operator_with_database_is_accepted() {
        let result = RequestHandler::validate_operator_database(&form(Operator::Sql, Some("warehouse")));
        assert!(result.is_ok());
    }

    #[test]
    fn bash_operator_without_database_is_accepted() {
        let result = RequestHandler::validate_operator_database(&form(Operator::Bash, None));
        assert!(result.is_ok());
    }
}
