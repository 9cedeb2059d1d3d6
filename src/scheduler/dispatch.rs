//! Dispatch pass (spec §4.4.1): unblock, deactivate-at-end, daily status
//! reset, due-check, materialize, and submit to the Task Broker.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{error, warn};

use crate::domain::job::{CronEvaluator, Job, JobStore};
use crate::domain::task::{TaskInstance, TaskState, TaskStore};
use crate::error::{Result, SchedulerError};
use crate::kernel::SchedulerContext;

/// Candidate batch size per tick; bounded so a single tick cannot starve the
/// lease-renew heartbeat (spec §5 "no unbounded blocking").
const TICK_BATCH_SIZE: i64 = 200;

pub async fn dispatch_pass(ctx: &SchedulerContext) {
    let now_utc = Utc::now();

    let jobs = match JobStore::claim_due(&ctx.db_pool, now_utc, TICK_BATCH_SIZE).await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, "dispatch pass: could not claim candidate jobs");
            return;
        }
    };

    for job in jobs {
        let job_name = job.name.clone();
        if let Err(e) = dispatch_one(ctx, job, now_utc).await {
            // Per-item tolerant: one job's failure never aborts the tick (spec §4.4.3).
            error!(job_name = %job_name, error = %e, "dispatch pass: job failed");
        }
    }
}

fn local_now(now_utc: DateTime<Utc>, timezone: &str) -> Result<NaiveDateTime> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidSchedule(format!("unknown timezone: {timezone}")))?;
    Ok(now_utc.with_timezone(&tz).naive_local())
}

fn utc_of(local_ts: NaiveDateTime, timezone: &str) -> Result<DateTime<Utc>> {
    use chrono::TimeZone;

    let tz: Tz = timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidSchedule(format!("unknown timezone: {timezone}")))?;

    let zoned = match tz.from_local_datetime(&local_ts) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&local_ts),
    };
    Ok(zoned.with_timezone(&Utc))
}

async fn dispatch_one(ctx: &SchedulerContext, mut job: Job, now_utc: DateTime<Utc>) -> Result<()> {
    let now_local = local_now(now_utc, &job.timezone)?;

    // 1. Unblock.
    if job.block_till.is_some_and(|till| now_utc >= till) {
        job.active = true;
        job.block_till = None;
        job.block_by = None;
        job.block_msg = None;
    }

    // 2. Deactivate-at-end.
    if job.window_closed(now_local) {
        job.active = false;
        JobStore::update(&ctx.db_pool, &job).await?;
        return Ok(());
    }

    // 3. Daily status reset.
    let today_reset = now_local.date().and_time(job.reset_status_at.time());
    if now_local >= today_reset && job.last_execution_ts.is_none_or(|t| t < today_reset) {
        job.status = crate::domain::job::JobHealth::Unknown;
    }

    // Still blocked, or deactivated for some other reason: persist any of
    // the above mutations and stop (no dispatch this tick).
    if job.is_blocked(now_utc) || !job.active {
        JobStore::update(&ctx.db_pool, &job).await?;
        return Ok(());
    }

    // 4. Due check.
    if utc_of(job.next_run_local_ts, &job.timezone)? > now_utc {
        JobStore::update(&ctx.db_pool, &job).await?;
        return Ok(());
    }

    // Unsupported operator (spec §9 "reserve in the enum...treat as
    // UnsupportedOperator at dispatch time"): refuse *before* materializing
    // any TaskInstance, and still advance next_run_local_ts as a normal
    // dispatch would. Checking this after materialize_and_dispatch would
    // leave a handle-less PENDING row behind every tick and, because the
    // schedule is never advanced on an error return, make the job due again
    // on the very next tick — a tight retry loop with unbounded row growth.
    if job.operator == crate::domain::job::Operator::Python {
        warn!(job_name = %job.name, "python operator is reserved but unimplemented, skipping dispatch");
        job.next_run_local_ts =
            CronEvaluator::next_fire(&job.schedule_interval, &job.timezone, job.next_run_local_ts)?;
        JobStore::update(&ctx.db_pool, &job).await?;
        return Ok(());
    }

    let execution_date = job.next_run_local_ts;
    materialize_and_dispatch(ctx, &job, execution_date).await?;

    // 7. Advance next_run_local_ts.
    job.next_run_local_ts = CronEvaluator::next_fire(&job.schedule_interval, &job.timezone, job.next_run_local_ts)?;
    JobStore::update(&ctx.db_pool, &job).await?;

    Ok(())
}

/// Steps 5-6 of the dispatch pass, shared with `force_schedule_for_job`
/// (spec §4.4.1 "Forced run"): materialize a `TaskInstance` and submit it to
/// the Task Broker, then persist the broker-assigned handle.
pub async fn materialize_and_dispatch(
    ctx: &SchedulerContext,
    job: &Job,
    execution_date: NaiveDateTime,
) -> Result<TaskInstance> {
    // Checked before any row is inserted: `dispatch_one` already refuses
    // python jobs before calling this function, but `force_schedule_for_job`
    // calls it directly, so this is the only guard on that path. Creating
    // the row first and rejecting after (the earlier ordering here) would
    // leave a handle-less PENDING `TaskInstance` behind on every forced run.
    if job.operator == crate::domain::job::Operator::Python {
        warn!(job_name = %job.name, "python operator is reserved but unimplemented, dispatch refused");
        return Err(SchedulerError::Broker("unsupported operator: python".to_string()));
    }

    let task = TaskInstance::builder()
        .job_name(job.name.clone())
        .execution_date(execution_date)
        .state(TaskState::Pending)
        .build();

    let task = TaskStore::create(&ctx.db_pool, &task).await?;

    let handle = ctx
        .broker
        .submit(job.operator, &job.command, job.database.as_deref())
        .await?;

    let mut task = task;
    task.task_handle = Some(handle);
    let task = TaskStore::update(&ctx.db_pool, &task).await?;

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn utc_of_round_trips_through_local_now() {
        let now = Utc::now();
        let local = local_now(now, "UTC").unwrap();
        let back = utc_of(local, "UTC").unwrap();
        assert_eq!(back.timestamp(), now.timestamp());
    }

    #[test]
    fn today_reset_combines_current_date_with_reset_time_of_day() {
        let local_now = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let reset_at = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let today_reset = local_now.date().and_time(reset_at.time());
        assert_eq!(
            today_reset,
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap()
        );
    }
}
