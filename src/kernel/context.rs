//! SchedulerContext: the explicit runtime context bundling every collaborator
//! the Scheduler Loop and Request Handler depend on.
//!
//! Grounded on the teacher's `ServerKernel` (`kernel/server_kernel.rs`) —
//! same dependency-injection shape, trimmed to what this system actually
//! uses. The teacher threads an `EventBus` through its kernel for its
//! engine/edge architecture; that event-sourcing machinery has no
//! counterpart here (see DESIGN.md), so `SchedulerContext` stays a plain
//! struct of `Arc`-shared collaborators rather than reaching for it.

use std::sync::Arc;

use sqlx::PgPool;

use super::broker::TaskBroker;
use super::lease::LeaseStore;
use super::mailer::MailSender;
use crate::config::Config;

/// Holds every infrastructure dependency the scheduling engine needs.
pub struct SchedulerContext {
    pub db_pool: PgPool,
    pub lease: LeaseStore,
    pub broker: Arc<dyn TaskBroker>,
    pub mailer: Arc<dyn MailSender>,
    pub config: Config,
}

impl SchedulerContext {
    pub fn new(
        db_pool: PgPool,
        broker: Arc<dyn TaskBroker>,
        mailer: Arc<dyn MailSender>,
        config: Config,
    ) -> Self {
        let lease = LeaseStore::new(db_pool.clone());
        Self {
            db_pool,
            lease,
            broker,
            mailer,
            config,
        }
    }
}
