//! Kernel - core infrastructure: the database pool, the Lease Store, and the
//! adapter traits (Task Broker, Mail Sender) that the scheduling engine is
//! injected with.
//!
//! Mirrors the teacher's split between `kernel` (infrastructure) and
//! `domains`/scheduling logic (business logic) — see `kernel/mod.rs` in the
//! teacher repo for the convention this module follows.

pub mod broker;
pub mod context;
pub mod lease;
pub mod mailer;

pub use broker::{BrokerStatus, HttpTaskBroker, InMemoryTaskBroker, NullTaskBroker, TaskBroker};
pub use context::SchedulerContext;
pub use lease::LeaseStore;
pub use mailer::{MailSender, NullMailSender, SmtpMailSender};
