//! Reconcile pass (spec §4.4.2): poll the Task Broker for each open task,
//! persist its state, and promote terminal outcomes onto the owning job.

use tracing::error;

use crate::alert::AlertFanout;
use crate::domain::job::{Job, JobHealth, JobStore};
use crate::domain::task::{TaskInstance, TaskStore};
use crate::error::Result;
use crate::kernel::SchedulerContext;

use super::success::SuccessPredicate;

pub async fn reconcile_pass(ctx: &SchedulerContext, success_predicate: &dyn SuccessPredicate) {
    let tasks = match TaskStore::list_open(&ctx.db_pool).await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "reconcile pass: could not list open tasks");
            return;
        }
    };

    for task in tasks {
        let task_id = task.id;
        if let Err(e) = reconcile_one(ctx, task, success_predicate).await {
            // Per-item tolerant (spec §4.4.3): one task's failure never aborts the tick.
            error!(task_id = %task_id, error = %e, "reconcile pass: task failed");
        }
    }
}

async fn reconcile_one(
    ctx: &SchedulerContext,
    mut task: TaskInstance,
    success_predicate: &dyn SuccessPredicate,
) -> Result<()> {
    let Some(handle) = task.task_handle.clone() else {
        // Dispatch hasn't persisted a handle yet; nothing to poll.
        return Ok(());
    };

    let status = ctx.broker.poll(&handle).await?;

    // 1. If state unchanged, nothing to do.
    if status.state == task.state {
        return Ok(());
    }

    // 2. Write the new state; terminal states also carry a truncated result.
    task.state = status.state;
    if task.state.is_terminal() {
        task.result = status.result.map(|r| Job::truncate_result(&r));
    }
    let task = TaskStore::update(&ctx.db_pool, &task).await?;

    // 3. Job status promotion, only on terminal transitions.
    if task.state.is_terminal() {
        promote(ctx, &task, success_predicate).await?;
    }

    Ok(())
}

async fn promote(
    ctx: &SchedulerContext,
    task: &TaskInstance,
    success_predicate: &dyn SuccessPredicate,
) -> Result<()> {
    let Some(mut job) = JobStore::get_by_name(&ctx.db_pool, &task.job_name).await? else {
        // The job was deleted between dispatch and reconcile; nothing left to promote onto.
        return Ok(());
    };

    job.last_execution_ts = Some(task.execution_date);
    job.last_task_result = task.result.clone();
    job.status = success_predicate.classify(task.result.as_deref());

    let job = JobStore::update(&ctx.db_pool, &job).await?;

    if job.status == JobHealth::Fail {
        AlertFanout::notify_failure(&ctx.db_pool, ctx.mailer.as_ref(), &job).await;
    }

    Ok(())
}
