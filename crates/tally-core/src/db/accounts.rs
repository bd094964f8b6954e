//! Chart of accounts operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Account, ExternalAccount};

const ACCOUNT_COLUMNS: &str = "id, tenant_id, external_id, name, classification, \
     account_sub_type, description, created_at, updated_at";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Account {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        external_id: row.get(2)?,
        name: row.get(3)?,
        classification: row.get(4)?,
        account_sub_type: row.get(5)?,
        description: row.get(6)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

impl Database {
    /// Insert or update accounts keyed by (tenant, external id).
    ///
    /// Runs as a single SQL transaction; accounts are never deleted.
    pub fn upsert_accounts(&self, tenant_id: &str, accounts: &[ExternalAccount]) -> Result<usize> {
        if accounts.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chart_of_accounts (
                    tenant_id, external_id, name, classification, account_sub_type, description
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, external_id) DO UPDATE SET
                    name = excluded.name,
                    classification = excluded.classification,
                    account_sub_type = excluded.account_sub_type,
                    description = excluded.description,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;

            for account in accounts {
                stmt.execute(params![
                    tenant_id,
                    account.external_id,
                    account.name,
                    account.classification,
                    account.account_sub_type,
                    account.description,
                ])?;
            }
        }
        tx.commit()?;

        Ok(accounts.len())
    }

    /// List a tenant's accounts by name
    pub fn list_accounts(&self, tenant_id: &str) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chart_of_accounts WHERE tenant_id = ? ORDER BY name, id",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![tenant_id], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get one of a tenant's accounts; another tenant's id yields None
    pub fn get_account(&self, tenant_id: &str, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {} FROM chart_of_accounts WHERE tenant_id = ? AND id = ?",
                    ACCOUNT_COLUMNS
                ),
                params![tenant_id, id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Look up an account by its external id
    pub fn get_account_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {} FROM chart_of_accounts WHERE tenant_id = ? AND external_id = ?",
                    ACCOUNT_COLUMNS
                ),
                params![tenant_id, external_id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Find an account by case-insensitive name
    pub fn find_account_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {} FROM chart_of_accounts \
                     WHERE tenant_id = ? AND name = ? COLLATE NOCASE \
                     ORDER BY id LIMIT 1",
                    ACCOUNT_COLUMNS
                ),
                params![tenant_id, name],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }
}
