//! Domain error kinds for the scheduling engine.
//!
//! Mirrors the two-tier convention used across the kernel: typed errors at
//! domain/Request Handler boundaries, `anyhow::Result` with `.context(...)`
//! everywhere else.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid email: {0}")]
    InvalidEmail(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A guarded mutation was refused because of the entity's current state
    /// (e.g. clearing history for a job with open tasks without `force`).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("mail error: {0}")]
    Mail(String),

    /// Catch-all for failures that don't fit a spec §7 error kind (e.g.
    /// password hashing) — never surfaced to a caller as validation input
    /// feedback.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
