//! Scheduler process entrypoint: loads configuration, acquires the lease,
//! and runs the Scheduler Loop until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use opsched_core::config::Config;
use opsched_core::kernel::{
    HttpTaskBroker, MailSender, NullMailSender, NullTaskBroker, SchedulerContext, SmtpMailSender, TaskBroker,
};
use opsched_core::scheduler::{LeaseBusyError, SchedulerLoop, EXIT_CODE_BUSY};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,opsched_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    tracing::info!("starting opsched");

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run pending migrations")?;

    // The Task Broker is a contract-only collaborator (spec §4.7): a real
    // deployment points BROKER_URL at whatever queue-fronting service
    // executes bash/sql commands. Without it, this binary falls back to the
    // always-succeeds stand-in so the scheduler loop has something to
    // submit/poll against out of the box.
    let broker: Arc<dyn TaskBroker> = match &config.broker_url {
        Some(broker_url) => {
            tracing::info!(%broker_url, "using HttpTaskBroker");
            Arc::new(HttpTaskBroker::new(broker_url.clone()).context("failed to build Task Broker client")?)
        }
        None => {
            tracing::warn!("BROKER_URL not set, using NullTaskBroker (dispatch only, no real execution)");
            Arc::new(NullTaskBroker)
        }
    };
    let mailer: Arc<dyn MailSender> = if config.smtp_username.is_some() {
        Arc::new(SmtpMailSender::from_config(&config)?)
    } else {
        tracing::warn!("no SMTP credentials configured, alert emails will be logged not sent");
        Arc::new(NullMailSender)
    };

    let ctx = SchedulerContext::new(pool, broker, mailer, config);
    let scheduler = SchedulerLoop::new(ctx);
    let shutdown = scheduler.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    if let Err(e) = scheduler.run().await {
        if e.downcast_ref::<LeaseBusyError>().is_some() {
            tracing::warn!(%e, "exiting with distinguished busy code");
            std::process::exit(EXIT_CODE_BUSY);
        }
        return Err(e);
    }

    Ok(())
}
