//! Tenant operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Tenant, TenantStats};

impl Database {
    /// Create a tenant, or rename it if it already exists
    pub fn upsert_tenant(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tenants (id, name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
            params![id, name],
        )?;
        Ok(())
    }

    /// Get a tenant by ID
    pub fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        let conn = self.conn()?;
        let tenant = conn
            .query_row(
                "SELECT id, name, created_at FROM tenants WHERE id = ?",
                params![id],
                |row| {
                    let created_at: String = row.get(2)?;
                    Ok(Tenant {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .optional()?;
        Ok(tenant)
    }

    /// List all tenants
    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM tenants ORDER BY id")?;

        let tenants = stmt
            .query_map([], |row| {
                let created_at: String = row.get(2)?;
                Ok(Tenant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tenants)
    }

    /// Counts for status output
    pub fn get_tenant_stats(&self, tenant_id: &str, max_attempts: u32) -> Result<TenantStats> {
        let conn = self.conn()?;

        let accounts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chart_of_accounts WHERE tenant_id = ?",
            params![tenant_id],
            |row| row.get(0),
        )?;

        let rules: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reconciliation_rules WHERE tenant_id = ?",
            params![tenant_id],
            |row| row.get(0),
        )?;

        let (transactions, awaiting_suggestion, awaiting_review, approved, dead_lettered): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' AND ai_suggested_account_id IS NULL
                    AND (?2 = 0 OR ai_attempts < ?2) THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' AND ai_suggested_account_id IS NOT NULL
                    THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' AND ai_suggested_account_id IS NULL
                    AND ?2 > 0 AND ai_attempts >= ?2 THEN 1 ELSE 0 END), 0)
            FROM transactions
            WHERE tenant_id = ?1
            "#,
            params![tenant_id, max_attempts],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(TenantStats {
            accounts,
            transactions,
            awaiting_suggestion,
            awaiting_review,
            approved,
            dead_lettered,
            rules,
        })
    }
}
