//! opsched - a cron-driven scheduler for recurring shell/SQL operational
//! jobs: a scheduling engine (data model, tick loop, lease-bound
//! single-leader guarantee) consumed by an HTTP/CLI surface that is out of
//! scope for this crate.

pub mod alert;
pub mod config;
pub mod domain;
pub mod error;
pub mod kernel;
pub mod request;
pub mod scheduler;

pub use config::Config;
pub use error::{SchedulerError, Result};
