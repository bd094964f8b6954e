//! Credential store: one OAuth connection per tenant

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Connection, NewConnection, TokenGrant};

impl Database {
    /// Get a tenant's connection
    pub fn get_connection(&self, tenant_id: &str) -> Result<Option<Connection>> {
        let conn = self.conn()?;
        let connection = conn
            .query_row(
                r#"
                SELECT tenant_id, realm_id, access_token, refresh_token,
                       access_token_expires_at, refresh_token_expires_at,
                       created_at, updated_at
                FROM connections WHERE tenant_id = ?
                "#,
                params![tenant_id],
                |row| {
                    let access_exp: String = row.get(4)?;
                    let refresh_exp: String = row.get(5)?;
                    let created_at: String = row.get(6)?;
                    let updated_at: String = row.get(7)?;
                    Ok(Connection {
                        tenant_id: row.get(0)?,
                        realm_id: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        access_token_expires_at: parse_datetime(&access_exp),
                        refresh_token_expires_at: parse_datetime(&refresh_exp),
                        created_at: parse_datetime(&created_at),
                        updated_at: parse_datetime(&updated_at),
                    })
                },
            )
            .optional()?;
        Ok(connection)
    }

    /// Create or replace a tenant's connection, creating the tenant if needed
    pub fn upsert_connection(&self, tenant_id: &str, new: &NewConnection) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO tenants (id, name) VALUES (?, ?)",
            params![tenant_id, tenant_id],
        )?;

        tx.execute(
            r#"
            INSERT INTO connections (
                tenant_id, realm_id, access_token, refresh_token,
                access_token_expires_at, refresh_token_expires_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                realm_id = excluded.realm_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                access_token_expires_at = excluded.access_token_expires_at,
                refresh_token_expires_at = excluded.refresh_token_expires_at,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                tenant_id,
                new.realm_id,
                new.access_token,
                new.refresh_token,
                format_datetime(new.access_token_expires_at),
                format_datetime(new.refresh_token_expires_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Persist a refreshed token grant received at `now`.
    ///
    /// Only token fields, expiries and `updated_at` change.
    pub fn update_connection_tokens(
        &self,
        tenant_id: &str,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (access_exp, refresh_exp) = grant.expiries(now);
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE connections SET
                access_token = ?,
                refresh_token = ?,
                access_token_expires_at = ?,
                refresh_token_expires_at = ?,
                updated_at = ?
            WHERE tenant_id = ?
            "#,
            params![
                grant.access_token,
                grant.refresh_token,
                format_datetime(access_exp),
                format_datetime(refresh_exp),
                format_datetime(now),
                tenant_id,
            ],
        )?;

        if updated == 0 {
            return Err(Error::ConnectionNotFound(tenant_id.to_string()));
        }
        Ok(())
    }

    /// Tenants that have a stored connection
    pub fn list_connected_tenants(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT tenant_id FROM connections ORDER BY tenant_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
