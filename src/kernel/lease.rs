//! Lease Store (spec §4.3): the TTL-bounded single-leader guarantee that
//! only one scheduler instance ever runs the dispatch/reconcile passes at a
//! time.
//!
//! Co-located in the same Postgres database as everything else rather than
//! a separate KV store — the spec's architecture diagram draws it as a
//! distinct box, but nothing in §4.3 requires a separate storage technology,
//! and a second datastore dependency buys nothing here. See DESIGN.md.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::Result;

/// There is exactly one lease row in play; the scheduler process is a
/// singleton (spec §4.3), so the key never varies.
pub const LEASE_KEY: &str = "scheduler_manager";

/// TTL-bounded mutual-exclusion lock over a single named resource.
pub struct LeaseStore {
    pool: PgPool,
}

impl LeaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attempt to acquire (or re-acquire as the same holder) the lease.
    /// Succeeds if the lease is unheld, expired, or already held by
    /// `holder`; fails (returns `Ok(false)`) if a live lease is held by a
    /// different worker.
    pub async fn acquire(&self, holder: &str, ttl_secs: u64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_leases (key, holder, expires_at)
            VALUES ($1, $2, NOW() + ($3 || ' seconds')::INTERVAL)
            ON CONFLICT (key) DO UPDATE
                SET holder = EXCLUDED.holder,
                    expires_at = EXCLUDED.expires_at
                WHERE scheduler_leases.expires_at < NOW()
                   OR scheduler_leases.holder = EXCLUDED.holder
            "#,
        )
        .bind(LEASE_KEY)
        .bind(holder)
        .bind(ttl_secs.to_string())
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() > 0;
        if acquired {
            info!(%holder, "lease acquired");
        } else {
            warn!(%holder, "lease held by another worker");
        }
        Ok(acquired)
    }

    /// Heartbeat: extend the lease's TTL. Fails if `holder` no longer owns it
    /// (spec §4.4 "lease renew" step).
    pub async fn renew(&self, holder: &str, ttl_secs: u64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduler_leases
            SET expires_at = NOW() + ($2 || ' seconds')::INTERVAL
            WHERE key = $1 AND holder = $3
            "#,
        )
        .bind(LEASE_KEY)
        .bind(ttl_secs.to_string())
        .bind(holder)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release the lease, allowing another worker to acquire it immediately
    /// (graceful shutdown path).
    pub async fn release(&self, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduler_leases WHERE key = $1 AND holder = $2")
            .bind(LEASE_KEY)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn current_expiry(&self) -> Result<Option<DateTime<Utc>>> {
        let expiry = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM scheduler_leases WHERE key = $1",
        )
        .bind(LEASE_KEY)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expiry)
    }
}
