//! Per-tenant sync leases
//!
//! A lease row claims a tenant for one sync run. An expired lease can be
//! taken over by any holder.

use std::time::Duration;

use chrono::Utc;
use rusqlite::params;

use super::{format_datetime, Database};
use crate::error::{Error, Result};

impl Database {
    /// Try to claim the tenant for `holder`; false if someone else holds a live lease
    pub fn acquire_sync_lease(&self, tenant_id: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Config(format!("Invalid lease TTL: {}", e)))?;

        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            INSERT INTO sync_leases (tenant_id, holder, acquired_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tenant_id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE sync_leases.expires_at <= ?3 OR sync_leases.holder = ?2
            "#,
            params![
                tenant_id,
                holder,
                format_datetime(now),
                format_datetime(now + ttl),
            ],
        )?;

        Ok(changed > 0)
    }

    /// Release a lease held by `holder`
    pub fn release_sync_lease(&self, tenant_id: &str, holder: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM sync_leases WHERE tenant_id = ? AND holder = ?",
            params![tenant_id, holder],
        )?;
        Ok(())
    }
}
